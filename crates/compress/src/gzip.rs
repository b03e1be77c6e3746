use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use tracing::instrument;

const MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Reports are small and produced once per page load, so always use the
/// highest level.
const LEVEL: Compression = Compression::best();

/// Whether `bytes` start with the gzip member header.
#[must_use]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

#[instrument(skip(input), fields(input_size = input.len(), output_size))]
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(input.len() / 4), LEVEL);
    encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
    let output = encoder.finish().or_raise(|| ErrorKind::Io)?;
    tracing::Span::current().record("output_size", output.len());
    Ok(output)
}

/// Largest inflated payload [`decompress`] accepts.
pub const MAX_DECOMPRESSED_SIZE: u64 = 16 * 1024 * 1024;

/// Inflate a complete gzip stream of at most [`MAX_DECOMPRESSED_SIZE`]
/// bytes. Truncated or corrupt input is [`ErrorKind::InvalidData`].
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    decompress_limited(input, MAX_DECOMPRESSED_SIZE)
}

/// Inflate at most `limit` bytes; anything longer is
/// [`ErrorKind::TooLarge`] and is not read past the limit.
#[instrument(skip(input), fields(input_size = input.len(), output_size))]
pub fn decompress_limited(input: &[u8], limit: u64) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    GzDecoder::new(input).take(limit.saturating_add(1)).read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
    if output.len() as u64 > limit {
        exn::bail!(ErrorKind::TooLarge(limit));
    }
    tracing::Span::current().record("output_size", output.len());
    Ok(output)
}
