//! Text-safe envelope: gzip, then standard base64.
//!
//! The sealed form is what the detector posts as `compressedData`.

use crate::error::{ErrorKind, Result};
use crate::gzip;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exn::ResultExt;
use tracing::instrument;

/// Gzip `payload` and encode it as standard (padded) base64.
///
/// # Examples
///
/// ```
/// use ucss_compress::envelope;
///
/// let sealed = envelope::seal(b"{}").unwrap();
/// assert_eq!(envelope::open(&sealed).unwrap(), b"{}");
/// ```
#[instrument(skip(payload), fields(payload_size = payload.len()))]
pub fn seal(payload: &[u8]) -> Result<String> {
    Ok(STANDARD.encode(gzip::compress(payload)?))
}

/// Reverse of [`seal`].
///
/// Surrounding whitespace is ignored. Anything that does not decode to a
/// gzip stream is rejected, even if it happens to be readable as-is.
#[instrument(skip(sealed), fields(sealed_size = sealed.len()))]
pub fn open(sealed: &str) -> Result<Vec<u8>> {
    let raw = STANDARD
        .decode(sealed.trim())
        .or_raise(|| ErrorKind::InvalidEncoding("payload is not valid base64".to_string()))?;
    if !gzip::is_gzip(&raw) {
        exn::bail!(ErrorKind::UnexpectedFormat("payload is not gzip".to_string()));
    }
    gzip::decompress(&raw)
}
