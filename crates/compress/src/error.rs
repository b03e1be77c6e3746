use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Why a payload could not be sealed or opened.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The gzip stream is corrupt or truncated.
    #[display("invalid or corrupted gzip data")]
    InvalidData,
    /// The base64 layer could not be decoded.
    #[display("invalid encoding: {_0}")]
    InvalidEncoding(#[error(not(source))] String),
    /// Decoded bytes are not a gzip stream.
    #[display("unexpected format: {_0}")]
    UnexpectedFormat(#[error(not(source))] String),
    /// The payload inflates past the given number of bytes.
    #[display("payload exceeds {_0} bytes once decompressed")]
    TooLarge(#[error(not(source))] u64),
    /// Writing to the in-memory encoder failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Only encoder failures are worth another attempt; every decode error
    /// is a property of the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
