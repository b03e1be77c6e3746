//! Points stylesheet links in rendered pages at their reduced copies.

use crate::consts::{HTML_DOCUMENT_REGEX, STYLESHEET_LINK_REGEX};
use crate::error::{ErrorKind, Result};
use crate::layout::is_empty_entry;
use crate::manifest::CacheManifest;
use crate::store::CacheStore;
use exn::ResultExt;
use tracing::instrument;
use ucss_config::{Config, Mode};
use ucss_detect::PROCESSED_ATTRIBUTE;
use url::Url;

#[derive(Clone, Debug)]
pub struct Rewriter {
    mode: Mode,
    /// Public URL of the site's cache directory, without a trailing slash.
    cache_url: String,
}

impl Rewriter {
    pub fn new(mode: Mode, cache_url: impl Into<String>) -> Self {
        Self { mode, cache_url: cache_url.into() }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.mode, config.cache_url().or_raise(|| ErrorKind::Config)?))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Rewrite `html` served at `current_url` using the page's manifest.
    ///
    /// Anything that gets in the way (a mode that does not rewrite for this
    /// viewer, output that is not an HTML document, a missing or unreadable
    /// manifest) leaves the output exactly as it was.
    #[instrument(skip(self, store, html), fields(%current_url, mode = %self.mode, html_size = html.len()))]
    pub async fn rewrite(&self, store: &CacheStore, html: &str, current_url: &Url, privileged: bool) -> String {
        if !self.mode.rewrites_for(privileged) || !HTML_DOCUMENT_REGEX.is_match(html) {
            return html.to_string();
        }
        match store.load_manifest(current_url).await {
            Ok(Some(manifest)) => self.apply(html, current_url, &manifest),
            Ok(None) => html.to_string(),
            Err(e) => {
                tracing::warn!(error = ?e, "could not read manifest, serving page unchanged");
                html.to_string()
            },
        }
    }

    /// Substitute every stylesheet link that `manifest` knows about. Only the
    /// matched tags change; the rest of the document is copied through.
    pub fn apply(&self, html: &str, current_url: &Url, manifest: &CacheManifest) -> String {
        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        let mut replaced = 0usize;
        for captures in STYLESHEET_LINK_REGEX.captures_iter(html) {
            let (Some(tag), Some(open), Some(href)) = (captures.get(0), captures.name("open"), captures.name("href")) else {
                continue;
            };
            let Some(file_name) = lookup(manifest, current_url, href.as_str()) else {
                continue;
            };
            let tag_text = tag.as_str();
            let open_end = open.end() - tag.start();
            let href_start = href.start() - tag.start();
            let href_end = href.end() - tag.start();
            let replacement = match self.mode {
                Mode::Stats => format!("{} {PROCESSED_ATTRIBUTE}='true'{}", &tag_text[..open_end], &tag_text[open_end..]),
                _ if is_empty_entry(file_name) => String::new(),
                _ => format!("{}{}/{}{}", &tag_text[..href_start], self.cache_url, file_name, &tag_text[href_end..]),
            };
            out.push_str(&html[last..tag.start()]);
            out.push_str(&replacement);
            last = tag.end();
            replaced += 1;
        }
        out.push_str(&html[last..]);
        tracing::debug!(replaced, "rewrote stylesheet links");
        out
    }
}

fn lookup<'m>(manifest: &'m CacheManifest, current_url: &Url, href: &str) -> Option<&'m str> {
    let href = href.trim();
    match current_url.join(href) {
        Ok(absolute) => manifest.get(absolute.as_str()),
        Err(_) => manifest.get(href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::EMPTY_FILE_NAME;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use ucss_detect::StylesheetUsageReport;
    use ucss_storage::backend::MockBackend;

    const CACHE_URL: &str = "https://example.com/wp-content/cache/acd-unused-css/example.com";

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<link rel='stylesheet' id='theme-css' href='https://example.com/wp-content/themes/site/style.css?ver=1.2' media='all' />
<link rel="stylesheet" href="/wp-content/plugins/forms/forms.css">
<link rel="stylesheet" href="https://cdn.example.net/lib.css">
<LINK REL="stylesheet" HREF="/wp-content/plugins/gallery/gallery.css">
</head><body></body></html>"#;

    fn url() -> Url {
        Url::parse("https://example.com/blog/hello/").unwrap()
    }

    fn manifest() -> CacheManifest {
        CacheManifest {
            lookup: BTreeMap::from([
                ("https://example.com/wp-content/themes/site/style.css?ver=1.2".to_string(), "aaaa.css".to_string()),
                ("https://example.com/wp-content/plugins/forms/forms.css".to_string(), EMPTY_FILE_NAME.clone()),
                ("https://example.com/wp-content/plugins/gallery/gallery.css".to_string(), "bbbb.css".to_string()),
            ]),
            source_url: url().to_string(),
            post_id: None,
            post_types: Vec::new(),
        }
    }

    #[test]
    fn test_enabled_rewrites_and_removes() {
        let out = Rewriter::new(Mode::Enabled, CACHE_URL).apply(PAGE, &url(), &manifest());
        assert!(out.contains(&format!("href='{CACHE_URL}/aaaa.css' media='all' />")));
        assert!(out.contains(&format!(r#"<LINK REL="stylesheet" HREF="{CACHE_URL}/bbbb.css">"#)));
        assert!(!out.contains("forms.css"));
        assert!(out.contains(r#"<link rel="stylesheet" href="https://cdn.example.net/lib.css">"#));
        assert!(!out.contains("themes/site/style.css"));
    }

    #[test]
    fn test_stats_only_marks_links() {
        let out = Rewriter::new(Mode::Stats, CACHE_URL).apply(PAGE, &url(), &manifest());
        assert!(out.contains(
            "<link data-ucss-processed='true' rel='stylesheet' id='theme-css' href='https://example.com/wp-content/themes/site/style.css?ver=1.2'"
        ));
        assert!(out.contains(r#"<link data-ucss-processed='true' rel="stylesheet" href="/wp-content/plugins/forms/forms.css">"#));
        assert!(out.contains(r#"<LINK data-ucss-processed='true' REL="stylesheet""#));
        assert!(out.contains(r#"<link rel="stylesheet" href="https://cdn.example.net/lib.css">"#));
        assert_eq!(out.matches(PROCESSED_ATTRIBUTE).count(), 3);
    }

    #[rstest]
    #[case(Mode::Stats)]
    #[case(Mode::Enabled)]
    fn test_lookalike_tag_names_untouched(#[case] mode: Mode) {
        // U+212A KELVIN SIGN folds to `k` under Unicode case folding.
        let html = "<html><lin\u{212A} rel=\"stylesheet\" href=\"/wp-content/plugins/gallery/gallery.css\"></html>";
        assert_eq!(Rewriter::new(mode, CACHE_URL).apply(html, &url(), &manifest()), html);
    }

    #[test]
    fn test_unknown_links_untouched() {
        let out = Rewriter::new(Mode::Enabled, CACHE_URL).apply(PAGE, &url(), &CacheManifest::default());
        assert_eq!(out, PAGE);
    }

    #[rstest]
    #[case(Mode::Disabled, true, false)]
    #[case(Mode::Preview, false, false)]
    #[case(Mode::Preview, true, true)]
    #[case(Mode::Enabled, false, true)]
    #[tokio::test]
    async fn test_rewrite_by_mode(#[case] mode: Mode, #[case] privileged: bool, #[case] changed: bool) {
        let store = CacheStore::new(Arc::new(MockBackend::default()));
        let report: StylesheetUsageReport = [("https://example.com/wp-content/plugins/forms/forms.css", "")].into_iter().collect();
        store.process(&report, url().as_str(), None, &[]).await.unwrap();

        let out = Rewriter::new(mode, CACHE_URL).rewrite(&store, PAGE, &url(), privileged).await;
        assert_eq!(out != PAGE, changed);
    }

    #[tokio::test]
    async fn test_passthrough_without_manifest_or_html() {
        let store = CacheStore::new(Arc::new(MockBackend::default()));
        let rewriter = Rewriter::new(Mode::Enabled, CACHE_URL);
        assert_eq!(rewriter.rewrite(&store, PAGE, &url(), false).await, PAGE);

        let report: StylesheetUsageReport = [("https://example.com/a.css", "")].into_iter().collect();
        store.process(&report, url().as_str(), None, &[]).await.unwrap();
        let json = r#"{"link":"<link rel='stylesheet' href='/a.css'>"}"#;
        assert_eq!(rewriter.rewrite(&store, json, &url(), false).await, json);
    }

    #[tokio::test]
    async fn test_passthrough_on_broken_manifest() {
        let backend = MockBackend::with_files([("blog/hello/lookup.json", b"not json".to_vec())]);
        let store = CacheStore::new(Arc::new(backend));
        let out = Rewriter::new(Mode::Enabled, CACHE_URL).rewrite(&store, PAGE, &url(), false).await;
        assert_eq!(out, PAGE);
    }
}
