use crate::consts::{POST_ID_REGEX, POST_TYPE_REGEX};
use crate::cssom::Stylesheet;
use crate::dom::Dom;
use crate::error::{ErrorKind, Result};
use crate::matcher::SelectorMatcher;
use crate::report::{StylesheetUsageReport, TransmissionEnvelope, UpdateCssRequest, UpdateCssResponse};
use crate::walker::StylesheetWalker;
use async_trait::async_trait;
use exn::ResultExt;
use tracing::instrument;
use ucss_config::{Config, IncludePatterns};

/// Delivers sealed reports to the cache.
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn transmit(&self, request: UpdateCssRequest) -> Result<UpdateCssResponse>;
}

/// Walks a document's stylesheets once and packages what it finds.
pub struct UsageCollector<'a, D: Dom> {
    dom: &'a D,
    matcher: SelectorMatcher,
    patterns: &'a IncludePatterns,
    cache_directory: &'a str,
    has_collected: bool,
}

impl<'a, D: Dom> UsageCollector<'a, D> {
    pub fn new(dom: &'a D, config: &'a Config) -> Self {
        Self {
            dom,
            matcher: SelectorMatcher::new(config.detector.log_warnings),
            patterns: &config.include_patterns,
            cache_directory: &config.cache.directory,
            has_collected: false,
        }
    }

    pub fn has_collected(&self) -> bool {
        self.has_collected
    }

    /// Same-host sheets that are neither cache output nor already processed.
    pub fn should_process_sheet(&self, sheet: &Stylesheet) -> bool {
        let Some(href) = &sheet.href else {
            return false;
        };
        let location = self.dom.location();
        href.host_str() == location.host_str()
            && href.port() == location.port()
            && !href.path().contains(self.cache_directory)
            && !sheet.processed
    }

    /// Walk every eligible sheet. Only the first call does anything; later
    /// calls return `None`. Also `None` when no sheet was eligible.
    #[instrument(skip(self), fields(url = %self.dom.location()))]
    pub fn collect(&mut self) -> Option<TransmissionEnvelope> {
        if self.has_collected {
            tracing::debug!("already collected");
            return None;
        }
        self.has_collected = true;

        let mut walker = StylesheetWalker::new(self.dom, self.matcher, self.patterns);
        let mut report = StylesheetUsageReport::default();
        for sheet in self.dom.stylesheets().iter().filter(|sheet| self.should_process_sheet(sheet)) {
            if let Some(href) = &sheet.href {
                let css = walker.walk(sheet);
                report.append(href.as_str(), &css);
            }
        }
        if report.is_empty() {
            tracing::debug!("no eligible stylesheets");
            return None;
        }

        let classes = self.dom.body_classes();
        let tally = walker.tally();
        tracing::debug!(sheets = report.len(), original = tally.original, filtered = tally.filtered, "collected");
        Some(TransmissionEnvelope {
            css: report,
            url: self.dom.location().to_string(),
            post_id: post_id(classes),
            post_types: post_types(classes),
            reduction: tally.reduction(),
        })
    }
}

/// Body classes naming the kind of page, in order.
pub fn post_types(classes: &[String]) -> Vec<String> {
    classes.iter().filter(|class| POST_TYPE_REGEX.is_match(class)).cloned().collect()
}

/// Id from the first `postid-<id>` or `page-id-<id>` body class.
pub fn post_id(classes: &[String]) -> Option<String> {
    classes.iter().find_map(|class| POST_ID_REGEX.captures(class).map(|captures| captures[1].to_string()))
}

/// Seal and send `envelope`. Failures are logged and the report dropped.
#[instrument(skip_all, fields(url = %envelope.url))]
pub async fn send_report(envelope: &TransmissionEnvelope, transmitter: &dyn Transmitter) {
    match deliver(envelope, transmitter).await {
        Ok(response) => tracing::info!(reduction = %response.reduction, "usage report accepted"),
        Err(err) => tracing::warn!(error = ?err, "usage report dropped"),
    }
}

async fn deliver(envelope: &TransmissionEnvelope, transmitter: &dyn Transmitter) -> Result<UpdateCssResponse> {
    let compressed_data = envelope.seal()?;
    transmitter
        .transmit(UpdateCssRequest { compressed_data })
        .await
        .or_raise(|| ErrorKind::Transmission("update endpoint refused the report".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MockDom;
    use rstest::rstest;
    use std::sync::Mutex;
    use url::Url;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<UpdateCssRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl Transmitter for Recorder {
        async fn transmit(&self, request: UpdateCssRequest) -> Result<UpdateCssResponse> {
            self.requests.lock().unwrap().push(request);
            match self.fail {
                true => exn::bail!(ErrorKind::Transmission("offline".to_string())),
                false => Ok(UpdateCssResponse::new(50.0)),
            }
        }
    }

    fn sheet(href: &str, css: &str) -> Stylesheet {
        Stylesheet::parse(css, Some(Url::parse(href).unwrap()), false).unwrap()
    }

    fn config() -> Config {
        Config { site_url: Url::parse("https://example.com/").unwrap(), ..Config::default() }
    }

    fn classes(list: &str) -> Vec<String> {
        list.split_whitespace().map(str::to_string).collect()
    }

    #[rstest]
    #[case("https://example.com/wp-content/themes/a/style.css", false, true)]
    #[case("https://cdn.example.net/style.css", false, false)]
    #[case("https://example.com:8443/style.css", false, false)]
    #[case("https://example.com/wp-content/cache/acd-unused-css/example.com/abc.css", false, false)]
    #[case("https://example.com/wp-content/themes/a/style.css", true, false)]
    fn test_should_process_sheet(#[case] href: &str, #[case] processed: bool, #[case] expected: bool) {
        let dom = MockDom::new("https://example.com/about/");
        let config = config();
        let collector = UsageCollector::new(&dom, &config);
        let mut sheet = sheet(href, "");
        sheet.processed = processed;
        assert_eq!(collector.should_process_sheet(&sheet), expected);
    }

    #[test]
    fn test_inline_sheets_are_skipped() {
        let dom = MockDom::new("https://example.com/");
        let config = config();
        let collector = UsageCollector::new(&dom, &config);
        assert!(!collector.should_process_sheet(&Stylesheet::default()));
    }

    #[test]
    fn test_post_types_and_id() {
        let body = classes("single single-post postid-42 wp-custom-logo full-width-template has-sidebar");
        assert_eq!(post_types(&body), ["single", "single-post", "full-width-template"]);
        assert_eq!(post_id(&body).as_deref(), Some("42"));
        assert_eq!(post_id(&classes("home blog")), None);
        assert_eq!(post_types(&classes("home blog paged search-results error404")), ["home", "blog", "paged", "search-results", "error404"]);
    }

    #[test]
    fn test_collect_once() {
        let dom = MockDom::new("https://example.com/shop/")
            .with_body_classes("page page-id-12 page-template-default")
            .with_matches(".used", &[0])
            .with_stylesheet(sheet("https://example.com/a.css", ".used { color: red; } .unused { color: blue; }"))
            .with_stylesheet(sheet("https://example.com/b.css", ".unused { color: blue; }"))
            .with_stylesheet(sheet("https://elsewhere.org/c.css", ".used { color: red; }"));
        let config = config();
        let mut collector = UsageCollector::new(&dom, &config);
        let envelope = collector.collect().unwrap();
        assert_eq!(envelope.url, "https://example.com/shop/");
        assert_eq!(envelope.post_id.as_deref(), Some("12"));
        assert_eq!(envelope.post_types, ["page", "page-id-12", "page-template-default"]);
        assert_eq!(envelope.css.len(), 2);
        assert!(envelope.css.get("https://example.com/a.css").unwrap().contains(".used"));
        assert_eq!(envelope.css.get("https://example.com/b.css"), Some(""));
        assert!(envelope.reduction > 0.0 && envelope.reduction < 100.0);

        assert!(collector.has_collected());
        assert!(collector.collect().is_none());
    }

    #[test]
    fn test_nothing_eligible_means_no_report() {
        let dom = MockDom::new("https://example.com/")
            .with_stylesheet(sheet("https://cdn.example.net/a.css", ".a { color: red; }"));
        let config = config();
        assert!(UsageCollector::new(&dom, &config).collect().is_none());
    }

    #[tokio::test]
    async fn test_send_report_seals_envelope() {
        let dom = MockDom::new("https://example.com/")
            .with_stylesheet(sheet("https://example.com/a.css", ".a { color: red; }"));
        let config = config();
        let envelope = UsageCollector::new(&dom, &config).collect().unwrap();
        let recorder = Recorder::default();
        send_report(&envelope, &recorder).await;
        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(TransmissionEnvelope::open(&requests[0].compressed_data).unwrap(), envelope);
    }

    #[tokio::test]
    async fn test_send_report_swallows_failures() {
        let dom = MockDom::new("https://example.com/")
            .with_stylesheet(sheet("https://example.com/a.css", ".a { color: red; }"));
        let config = config();
        let envelope = UsageCollector::new(&dom, &config).collect().unwrap();
        let recorder = Recorder { fail: true, ..Recorder::default() };
        send_report(&envelope, &recorder).await;
        assert_eq!(recorder.requests.lock().unwrap().len(), 1);
    }
}
