use std::fmt;

/// A CRC32C (Castagnoli) checksum, rendered as base64 in the on-disk and
/// catalog formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Crc32cHash(u32);

impl Crc32cHash {
    pub const ZERO: Crc32cHash = Crc32cHash(0);

    pub fn from_u32(v: u32) -> Self {
        Crc32cHash(v)
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }

    pub fn to_base64(self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(self.0.to_be_bytes())
    }

    pub fn from_base64(s: &str) -> Option<Self> {
        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::STANDARD.decode(s).ok()?;
        let arr: [u8; 4] = bytes.try_into().ok()?;
        Some(Crc32cHash(u32::from_be_bytes(arr)))
    }
}

impl fmt::Display for Crc32cHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// Incrementally hash a byte stream with CRC32C.
#[derive(Default)]
pub struct Hasher(u32);

impl Hasher {
    pub fn new() -> Self {
        Hasher(0)
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.0 = crc32c::crc32c_append(self.0, buf);
    }

    pub fn finish(self) -> Crc32cHash {
        Crc32cHash(self.0)
    }
}
