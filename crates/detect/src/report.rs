//! What the detector sends home, and the shape it travels in.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// Filtered CSS per stylesheet URL for a single page view.
///
/// Only the collector adds to a report; everyone else gets it read-only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StylesheetUsageReport(BTreeMap<String, String>);

impl StylesheetUsageReport {
    /// Append `css` to whatever is already recorded for `href`. The entry
    /// exists afterwards even when `css` is empty.
    pub(crate) fn append(&mut self, href: &str, css: &str) {
        self.0.entry(href.to_string()).or_default().push_str(css);
    }

    pub fn get(&self, href: &str) -> Option<&str> {
        self.0.get(href).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries ordered by stylesheet URL.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(href, css)| (href.as_str(), css.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StylesheetUsageReport {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A report plus the page context the cache needs to file it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionEnvelope {
    pub css: StylesheetUsageReport,
    /// Full URL of the page the report was collected on.
    pub url: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub post_types: Vec<String>,
    /// Percentage of style rule bytes that were dropped.
    #[serde(default)]
    pub reduction: f64,
}

impl TransmissionEnvelope {
    /// JSON, gzipped, base64-encoded.
    #[instrument(skip(self), fields(url = %self.url, sheets = self.css.len()))]
    pub fn seal(&self) -> Result<String> {
        let json = serde_json::to_vec(self).or_raise(|| ErrorKind::Encoding)?;
        ucss_compress::envelope::seal(&json).or_raise(|| ErrorKind::Encoding)
    }

    /// Reverse of [`seal`](Self::seal).
    #[instrument(skip(sealed), fields(sealed_size = sealed.len()))]
    pub fn open(sealed: &str) -> Result<Self> {
        let json = ucss_compress::envelope::open(sealed)
            .or_raise(|| ErrorKind::InvalidPayload("could not decompress payload".to_string()))?;
        serde_json::from_slice(&json).or_raise(|| ErrorKind::InvalidPayload("could not parse payload".to_string()))
    }
}

/// Request body of the update endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCssRequest {
    #[serde(rename = "compressedData")]
    pub compressed_data: String,
}

/// Successful response of the update endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCssResponse {
    /// Reduction percentage with two decimals.
    pub reduction: String,
}

impl UpdateCssResponse {
    pub fn new(reduction: f64) -> Self {
        Self { reduction: format!("{reduction:.2}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> TransmissionEnvelope {
        TransmissionEnvelope {
            css: [("https://example.com/a.css", ".a{color:red}\n"), ("https://example.com/b.css", "")]
                .into_iter()
                .collect(),
            url: "https://example.com/blog/hello/".to_string(),
            post_id: Some("42".to_string()),
            post_types: vec!["single".to_string(), "single-post".to_string()],
            reduction: 37.5,
        }
    }

    #[test]
    fn test_append_keeps_empty_entries() {
        let mut report = StylesheetUsageReport::default();
        report.append("https://example.com/a.css", "");
        report.append("https://example.com/a.css", ".a{}");
        report.append("https://example.com/b.css", "");
        assert_eq!(report.len(), 2);
        assert_eq!(report.get("https://example.com/a.css"), Some(".a{}"));
        assert_eq!(report.get("https://example.com/b.css"), Some(""));
    }

    #[test]
    fn test_json_field_names() {
        let value = serde_json::to_value(envelope()).unwrap();
        assert_eq!(value["css"]["https://example.com/b.css"], "");
        assert_eq!(value["url"], "https://example.com/blog/hello/");
        assert_eq!(value["post_id"], "42");
        assert_eq!(value["post_types"][1], "single-post");
        assert_eq!(value["reduction"], 37.5);
    }

    #[test]
    fn test_sealed_envelope_opens() {
        let sealed = envelope().seal().unwrap();
        assert_eq!(TransmissionEnvelope::open(&sealed).unwrap(), envelope());
    }

    #[test]
    fn test_open_accepts_null_post_id() {
        let sealed = ucss_compress::envelope::seal(br#"{"css":{},"url":"https://example.com/","post_id":null,"post_types":[],"reduction":0}"#).unwrap();
        let opened = TransmissionEnvelope::open(&sealed).unwrap();
        assert_eq!(opened.post_id, None);
        assert!(opened.css.is_empty());
    }

    #[test]
    fn test_open_rejects_non_envelope_json() {
        let sealed = ucss_compress::envelope::seal(b"[1,2,3]").unwrap();
        let err = TransmissionEnvelope::open(&sealed).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPayload(_)));
    }

    #[test]
    fn test_request_uses_camel_case_key() {
        let request: UpdateCssRequest = serde_json::from_str(r#"{"compressedData":"abc"}"#).unwrap();
        assert_eq!(request.compressed_data, "abc");
    }

    #[test]
    fn test_response_has_two_decimals() {
        assert_eq!(UpdateCssResponse::new(12.3456).reduction, "12.35");
        assert_eq!(UpdateCssResponse::new(0.0).reduction, "0.00");
    }
}
