//! Server Error Types

use derive_more::{Display, Error};

/// A server error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration could not be loaded or does not describe a site.
    #[display("invalid configuration")]
    Config,
    /// A usage report could not be decoded. The sender has to fix it.
    #[display("malformed update: {_0}")]
    InvalidPayload(#[error(not(source))] String),
    /// The cache could not be read or written.
    #[display("cache error")]
    Cache,
    /// Usage detection could not run.
    #[display("detection failed")]
    Detect,
    /// Local files or sockets.
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Io(_))
    }
}
