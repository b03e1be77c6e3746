//! Detection Error Types
//!
//! Nothing in here is allowed to break the page being analysed: callers log
//! these and carry on without the offending rule, sheet or report.

use derive_more::{Display, Error};

/// A detection error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The selector engine refused a selector. Treat the rule as unused.
    #[display("invalid selector: {_0}")]
    InvalidSelector(#[error(not(source))] String),
    /// A stylesheet could not be parsed at all.
    #[display("unparseable stylesheet: {_0}")]
    Stylesheet(#[error(not(source))] String),
    /// A stylesheet could not be fetched.
    #[display("failed to load stylesheet: {_0}")]
    Load(#[error(not(source))] String),
    /// The report could not be serialized or sealed.
    #[display("failed to encode usage report")]
    Encoding,
    /// A sealed report could not be opened or does not have the expected
    /// shape. Reject it, resending the same bytes will not help.
    #[display("invalid usage report: {_0}")]
    InvalidPayload(#[error(not(source))] String),
    /// The report was sealed but could not be delivered.
    #[display("transmission failed: {_0}")]
    Transmission(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Reports are never retried by the detector itself, but a caller
    /// driving it from a batch job may want to.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Load(_) | ErrorKind::Transmission(_))
    }
}
