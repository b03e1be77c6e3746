//! Content-addressed cache of reduced stylesheets.
//!
//! Reports from the detector are filed by [`CacheStore`]: every stylesheet is
//! minified, its relative references are made absolute, and the result is
//! stored under the BLAKE3 hash of its content. A per-page
//! [`CacheManifest`] maps original stylesheet URLs onto those files.
//! [`Rewriter`] uses the manifest to swap links in rendered pages, and
//! [`StatsAggregator`] reads all manifests to report which plugins ship CSS
//! that pages never use.
//!
//! The cache is disposable: clearing it only means pages are served with
//! their original stylesheets until they are analysed again.

mod consts;
pub mod error;
mod invalidate;
pub mod layout;
mod manifest;
mod minify;
mod rewrite;
pub mod stats;
mod store;

pub use crate::invalidate::{Invalidator, NoopInvalidator};
pub use crate::manifest::CacheManifest;
pub use crate::minify::{LightningMinifier, Minifier};
pub use crate::rewrite::Rewriter;
pub use crate::stats::{StatsAggregator, StatsData};
pub use crate::store::{CacheStore, CacheSummary};
