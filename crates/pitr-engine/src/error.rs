use thiserror::Error;

/// Errors surfaced by one call into the engine's orchestration layer
/// (a single cycle, or the on-demand stage operation). `anyhow` is used only
/// at the boundary that collapses one of *these* into a caller-facing
/// report ([`crate::PitrEngine::run`]); everywhere inside the engine the
/// concrete `thiserror` types below are propagated with `?`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sync(#[from] pitr_sync::Error),

    #[error(transparent)]
    Catalog(#[from] pitr_catalog::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
