//! Stylesheet usage detection.
//!
//! Given a rendered document, work out which rules of its same-site
//! stylesheets actually apply and rebuild those sheets from just them:
//!
//! - [`matcher`] decides whether one selector is in use,
//! - [`walker`] rebuilds one stylesheet,
//! - [`UsageCollector`] walks every eligible sheet once and packages the
//!   result as a [`TransmissionEnvelope`],
//! - [`Scheduler`] decides when that happens on a live page.
//!
//! Documents are reached through the [`Dom`] trait; [`HtmlDocument`] is the
//! implementation for static HTML.

mod collector;
mod consts;
pub mod cssom;
pub mod dom;
pub mod error;
mod html;
pub mod matcher;
pub mod report;
mod scheduler;
pub mod urls;
pub mod walker;

use tracing::instrument;
use ucss_config::Config;
use url::Url;

pub use crate::collector::{Transmitter, UsageCollector, post_id, post_types, send_report};
use crate::cssom::StylesheetLoader;
pub use crate::dom::Dom;
use crate::error::Result;
pub use crate::html::{HtmlDocument, PROCESSED_ATTRIBUTE};
pub use crate::report::{StylesheetUsageReport, TransmissionEnvelope, UpdateCssRequest, UpdateCssResponse};
pub use crate::scheduler::{IdleFacility, Scheduler, SchedulerState, ScrollEvent, Trigger, YieldIdle};

/// Collect usage for a static page right away, without scheduling.
///
/// `None` when the page has no eligible stylesheets.
#[instrument(skip(html, config, loader), fields(%location))]
pub async fn detect(
    html: &str,
    location: Url,
    config: &Config,
    loader: &dyn StylesheetLoader,
) -> Result<Option<TransmissionEnvelope>> {
    let document = HtmlDocument::load(html, location, loader).await?;
    Ok(UsageCollector::new(&document, config).collect())
}
