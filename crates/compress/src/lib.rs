//! Compression for the detector to server transport.
//!
//! Usage reports travel as JSON, gzipped, then base64-encoded so that they
//! can be embedded in a JSON request body. [`envelope::seal`] and
//! [`envelope::open`] do both steps; [`gzip`] exposes the compression layer
//! on its own.

pub mod envelope;
pub mod error;
pub mod gzip;
