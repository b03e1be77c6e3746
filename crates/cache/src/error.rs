//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The cache tree could not be read or written.
    #[display("cache storage error")]
    Storage,
    /// A page URL cannot be mapped onto the cache tree.
    #[display("invalid page URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// A manifest exists but is not valid JSON of the expected shape.
    #[display("invalid manifest: {_0}")]
    InvalidManifest(#[error(not(source))] String),
    /// The configuration does not describe a usable cache location.
    #[display("invalid cache configuration")]
    Config,
    /// A downstream page cache refused to drop a page.
    #[display("invalidation failed for post {_0}")]
    Invalidation(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Invalidation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Storage.is_retryable());
        assert!(!ErrorKind::InvalidUrl("not a url".to_string()).is_retryable());
        assert!(!ErrorKind::InvalidManifest("expected a map".to_string()).is_retryable());
    }
}
