//! Cache key type

use std::fmt;

use crate::error::{Error, Result};

/// Length of a rendered cache key in characters
pub const KEY_LEN: usize = 64;

/// Content-derived cache key: 64 lowercase hex characters, the rendering of
/// a SHA-256 digest.
///
/// The key doubles as the filename stem for both files of a cache entry, so
/// parsing a directory listing back into keys must be exact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Render a digest as a key
    pub fn from_digest(digest: &[u8]) -> Self {
        use std::fmt::Write as _;

        debug_assert_eq!(digest.len(), KEY_LEN / 2);
        let mut s = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(s, "{:02x}", byte);
        }
        CacheKey(s)
    }

    /// Parse a key from a filename stem
    ///
    /// # Arguments
    /// * `s` - Candidate stem
    ///
    /// # Returns
    /// * `Result<CacheKey>` - `Error::InvalidKey` unless `s` is exactly 64
    ///   lowercase hex characters
    pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == KEY_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if valid {
            Ok(CacheKey(s.to_string()))
        } else {
            Err(Error::InvalidKey(s.to_string()))
        }
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
