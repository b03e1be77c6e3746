//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant means the operator has to fix the configuration; nothing
/// here is retryable.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source could not be parsed or a value has the wrong shape.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// An include pattern is not a valid regular expression.
    #[display("invalid include pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// The site URL has no host to key the cache directory by.
    #[display("site URL has no host: {_0}")]
    MissingHost(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
