//! A [`Dom`] backed by a static HTML document.
//!
//! Stylesheets are loaded once, up front. Computed styles for pseudo-elements
//! are derived from the loaded rules by matching their base selectors against
//! the element; `!important` wins over normal declarations and otherwise the
//! last declaration in document order wins. Specificity and media conditions
//! are not taken into account.

use crate::consts::{BODY_SELECTOR, STYLESHEET_SELECTOR, TRAILING_PSEUDO_REGEX};
use crate::cssom::{Declaration, Rule, Stylesheet, StylesheetLoader};
use crate::dom::{ComputedStyle, Dom};
use crate::error::{ErrorKind, Result};
use crate::matcher::MatchTarget;
use scraper::{ElementRef, Html, Selector};
use tracing::instrument;
use url::Url;

/// Attribute marking a link the rewrite step has already seen.
pub const PROCESSED_ATTRIBUTE: &str = "data-ucss-processed";

/// Where a stylesheet's text comes from.
enum Source {
    Link { href: Url, processed: bool },
    Inline(String),
}

/// Declarations of one rule that style a pseudo-element.
#[derive(Debug)]
struct PseudoRule {
    selector: Selector,
    pseudo: String,
    content: Option<Declaration>,
    display: Option<Declaration>,
}

pub struct HtmlDocument {
    html: Html,
    location: Url,
    body_classes: Vec<String>,
    stylesheets: Vec<Stylesheet>,
    pseudo_rules: Vec<PseudoRule>,
}

impl HtmlDocument {
    /// Parse `html` served from `location` and load its stylesheets, including
    /// their imports, through `loader`. Linked sheets that fail to load are
    /// left out, as a browser would have no rules for them either.
    #[instrument(skip(html, loader), fields(%location, html_size = html.len()))]
    pub async fn load(html: &str, location: Url, loader: &dyn StylesheetLoader) -> Result<Self> {
        let sources = stylesheet_sources(html, &location);
        let mut stylesheets = Vec::with_capacity(sources.len());
        for source in sources {
            let sheet = match source {
                Source::Link { href, processed } => match loader.load(&href).await {
                    Ok(text) => Stylesheet::parse(&text, Some(href), processed),
                    Err(e) => {
                        tracing::warn!(%href, error = ?e, "could not load stylesheet");
                        continue;
                    },
                },
                Source::Inline(text) => Stylesheet::parse(&text, None, false),
            };
            match sheet {
                Ok(mut sheet) => {
                    sheet.load_imports(loader).await;
                    stylesheets.push(sheet);
                },
                Err(e) => tracing::warn!(error = ?e, "could not parse stylesheet"),
            }
        }
        Ok(Self::new(html, location, stylesheets))
    }

    /// Build from already loaded stylesheets.
    pub fn new(html: &str, location: Url, stylesheets: Vec<Stylesheet>) -> Self {
        let html = Html::parse_document(html);
        let body_classes = html
            .select(&BODY_SELECTOR)
            .next()
            .map(|body| body.value().classes().map(str::to_string).collect())
            .unwrap_or_default();
        let pseudo_rules = stylesheets.iter().flat_map(|sheet| sheet.all_rules()).flat_map(pseudo_rules).collect();
        Self { html, location, body_classes, stylesheets, pseudo_rules }
    }
}

impl Dom for HtmlDocument {
    type Node<'a> = ElementRef<'a>;

    fn location(&self) -> &Url {
        &self.location
    }

    fn body_classes(&self) -> &[String] {
        &self.body_classes
    }

    fn stylesheets(&self) -> &[Stylesheet] {
        &self.stylesheets
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementRef<'_>>> {
        let parsed = Selector::parse(selector).map_err(|e| ErrorKind::InvalidSelector(format!("{selector}: {e}")))?;
        Ok(self.html.select(&parsed).collect())
    }

    fn computed_style(&self, node: ElementRef<'_>, pseudo: &str) -> ComputedStyle {
        let mut content: Option<&Declaration> = None;
        let mut display: Option<&Declaration> = None;
        for rule in self.pseudo_rules.iter().filter(|r| r.pseudo == pseudo && r.selector.matches(&node)) {
            cascade(&mut content, rule.content.as_ref());
            cascade(&mut display, rule.display.as_ref());
        }
        let mut style = ComputedStyle::initial(pseudo);
        if let Some(content) = content {
            style.content = content.value.clone();
        }
        if let Some(display) = display {
            style.display = display.value.clone();
        }
        style
    }
}

fn cascade<'a>(winner: &mut Option<&'a Declaration>, candidate: Option<&'a Declaration>) {
    let Some(candidate) = candidate else {
        return;
    };
    if winner.is_none_or(|current| candidate.important || !current.important) {
        *winner = Some(candidate);
    }
}

fn stylesheet_sources(html: &str, location: &Url) -> Vec<Source> {
    let document = Html::parse_document(html);
    let mut sources = Vec::new();
    for element in document.select(&STYLESHEET_SELECTOR) {
        match element.value().name() {
            "link" => {
                let is_stylesheet = element
                    .value()
                    .attr("rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|token| token.eq_ignore_ascii_case("stylesheet")));
                let Some(href) = element.value().attr("href").filter(|_| is_stylesheet) else {
                    continue;
                };
                match location.join(href.trim()) {
                    Ok(href) => {
                        let processed = element.value().attr(PROCESSED_ATTRIBUTE) == Some("true");
                        sources.push(Source::Link { href, processed });
                    },
                    Err(e) => tracing::warn!(href, error = %e, "could not resolve stylesheet link"),
                }
            },
            _ => sources.push(Source::Inline(element.text().collect())),
        }
    }
    sources
}

fn pseudo_rules(rule: &Rule) -> Vec<PseudoRule> {
    let Rule::Style(style) = rule else {
        return Vec::new();
    };
    let content = style.declared("content");
    let display = style.declared("display");
    if content.is_none() && display.is_none() {
        return Vec::new();
    }
    split_selector_list(&style.selector_text)
        .into_iter()
        .filter(|part| TRAILING_PSEUDO_REGEX.is_match(part))
        .filter_map(|part| {
            let target = MatchTarget::new(part);
            let pseudo = target.pseudo_element?;
            let selector = Selector::parse(&target.base).ok()?;
            Some(PseudoRule { selector, pseudo, content: content.cloned(), display: display.cloned() })
        })
        .collect()
}

/// Split a selector list at top-level commas.
fn split_selector_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, ch) in list.char_indices() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {},
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(list[start..index].trim());
                start = index + 1;
            },
            _ => {},
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}
