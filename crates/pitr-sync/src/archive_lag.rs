//! The archive-lag configuration one-shot: nudges `archive_lag_target` to a
//! bounded value if the database has left it unset, so the worst-case time
//! until the next archived log is predictable. Runs once at startup, before
//! the periodic loops; its failure is logged, never fatal.

use pitr_db::{column, DbQuery, Queries};
use tracing::{debug, info, warn};

pub async fn configure_archive_lag(db: &dyn DbQuery, queries: &Queries) {
    let rows = match db.run_formatted(&queries.parameter_view).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "failed to query archive_lag_target, skipping startup nudge");
            return;
        }
    };

    let value = match rows.first().and_then(|row| column(row, "VALUE").ok()) {
        Some(v) => v.to_string(),
        None => {
            warn!("parameter view returned no VALUE column for archive_lag_target, skipping startup nudge");
            return;
        }
    };

    if value != "0" {
        debug!(value, "archive_lag_target already configured, leaving as-is");
        return;
    }

    match db.run_formatted(&queries.archive_lag_alter).await {
        Ok(_) => info!("archive_lag_target was unset, set to 600 seconds"),
        Err(e) => warn!(error = %e, "failed to set archive_lag_target, continuing with existing value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitr_db::testing::FakeDb;

    fn row_with_value(value: &str) -> pitr_db::Row {
        let mut row = pitr_db::Row::new();
        row.insert("VALUE".to_string(), value.to_string());
        row
    }

    #[tokio::test]
    async fn issues_the_ddl_when_lag_target_is_unset() {
        let db = FakeDb::new();
        let queries = Queries::default();
        db.on(queries.parameter_view.clone(), vec![row_with_value("0")]).await;
        db.on(queries.archive_lag_alter.clone(), vec![]).await;

        configure_archive_lag(&db, &queries).await;
    }

    #[tokio::test]
    async fn skips_the_ddl_when_lag_target_is_already_set() {
        let db = FakeDb::new();
        let queries = Queries::default();
        db.on(queries.parameter_view.clone(), vec![row_with_value("900")]).await;
        db.on_err(queries.archive_lag_alter.clone(), pitr_db::Error::Query("should not be called".to_string()))
            .await;

        configure_archive_lag(&db, &queries).await;
    }

    #[tokio::test]
    async fn a_failed_parameter_query_is_swallowed() {
        let db = FakeDb::new();
        let queries = Queries::default();
        db.on_err(queries.parameter_view.clone(), pitr_db::Error::Query("connection lost".to_string()))
            .await;

        configure_archive_lag(&db, &queries).await;
    }
}
