//! Rebuilds a stylesheet from the rules a document actually uses.

use crate::cssom::{Rule, StyleRule, Stylesheet};
use crate::dom::Dom;
use crate::matcher::SelectorMatcher;
use crate::urls::absolutize;
use std::collections::HashSet;
use tracing::instrument;
use ucss_config::IncludePatterns;

/// Byte counts of style rules seen and kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub original: usize,
    pub filtered: usize,
}

impl Tally {
    /// Percentage of style rule bytes removed, `0` when nothing was seen.
    pub fn reduction(&self) -> f64 {
        if self.original == 0 {
            return 0.0;
        }
        (self.original as f64 - self.filtered as f64) / self.original as f64 * 100.0
    }
}

pub struct StylesheetWalker<'a, D: Dom> {
    dom: &'a D,
    matcher: SelectorMatcher,
    patterns: &'a IncludePatterns,
    tally: Tally,
}

impl<'a, D: Dom> StylesheetWalker<'a, D> {
    pub fn new(dom: &'a D, matcher: SelectorMatcher, patterns: &'a IncludePatterns) -> Self {
        Self { dom, matcher, patterns, tally: Tally::default() }
    }

    /// Running totals over every sheet walked so far.
    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Reconstruct `sheet`, keeping used style rules, used `@font-face`
    /// blocks and every `@keyframes`. Imported sheets are inlined where the
    /// `@import` stood, with their relative references resolved against the
    /// imported sheet's own URL.
    #[instrument(skip_all, fields(href = sheet.href.as_ref().map(|h| h.as_str())))]
    pub fn walk(&mut self, sheet: &Stylesheet) -> String {
        let families = used_font_families(&sheet.rules);
        let mut out = String::new();
        for rule in &sheet.rules {
            match rule {
                Rule::Import { sheet: Some(imported), .. } => {
                    let text = self.walk(imported);
                    match &imported.href {
                        Some(href) => out.push_str(&absolutize(&text, href)),
                        None => out.push_str(&text),
                    }
                },
                Rule::Import { url, sheet: None } => tracing::debug!(%url, "import was not loaded"),
                Rule::Media { query, rules } => {
                    let mut inner = String::new();
                    for rule in rules {
                        if let Rule::Style(style) = rule
                            && self.is_used(style)
                        {
                            inner.push_str("  ");
                            inner.push_str(&reconstruct(style));
                            inner.push('\n');
                        }
                    }
                    if !inner.is_empty() {
                        out.push_str(&format!("@media {query} {{\n{inner}}}\n"));
                    }
                },
                Rule::Keyframes { css_text } => {
                    out.push_str(css_text);
                    out.push('\n');
                },
                Rule::FontFace { families: declared, css_text } => {
                    if declared.iter().any(|family| families.contains(family.as_str())) {
                        out.push_str(css_text);
                        out.push('\n');
                    }
                },
                Rule::Style(style) => {
                    self.tally.original += style.css_text.len();
                    if self.is_used(style) {
                        let text = reconstruct(style);
                        self.tally.filtered += text.len();
                        out.push_str(&text);
                        out.push('\n');
                    }
                },
                Rule::Other { .. } => {},
            }
        }
        out
    }

    fn is_used(&self, rule: &StyleRule) -> bool {
        let used = self.patterns.matches(&rule.selector_text) || self.matcher.matches(&rule.selector_text, self.dom);
        tracing::trace!(selector = %rule.selector_text, used, "tested rule");
        used
    }
}

/// Families named by top-level style rules.
fn used_font_families(rules: &[Rule]) -> HashSet<&str> {
    rules
        .iter()
        .filter_map(|rule| match rule {
            Rule::Style(style) => Some(style.font_families.iter().map(String::as_str)),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Serialized `rule`, with private-use characters in `content` values
/// written as escapes.
pub fn reconstruct(rule: &StyleRule) -> String {
    let mut text = rule.css_text.clone();
    for declaration in rule.declarations.iter().filter(|d| d.name == "content") {
        let escaped = escape_private_use(&declaration.value);
        if escaped != declaration.value {
            text = text.replace(&format!("content: {}", declaration.value), &format!("content: {escaped}"));
        }
    }
    text
}

/// Replace characters in U+E000..=U+F8FF with CSS hex escapes (`\f101`).
///
/// A space terminates the escape when the next character would otherwise be
/// read as part of it.
pub fn escape_private_use(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if !('\u{E000}'..='\u{F8FF}').contains(&ch) {
            out.push(ch);
            continue;
        }
        out.push_str(&format!("\\{:04x}", u32::from(ch)));
        if chars.peek().is_some_and(|next| next.is_ascii_hexdigit() || next.is_whitespace()) {
            out.push(' ');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cssom::MockLoader;
    use crate::dom::MockDom;
    use rstest::rstest;
    use url::Url;

    fn sheet(css: &str) -> Stylesheet {
        Stylesheet::parse(css, Some(Url::parse("https://example.com/style.css").unwrap()), false).unwrap()
    }

    fn walk(dom: &MockDom, css: &str) -> (String, Tally) {
        let patterns = IncludePatterns::default();
        let mut walker = StylesheetWalker::new(dom, SelectorMatcher::default(), &patterns);
        let out = walker.walk(&sheet(css));
        (out, walker.tally())
    }

    #[test]
    fn test_keeps_matched_and_included_rules() {
        let dom = MockDom::new("https://example.com/").with_matches(".used", &[0]);
        let (out, tally) = walk(&dom, ".used { color: red; } .unused { color: blue; } .dropdown-menu { display: none; }");
        assert!(out.contains(".used"));
        assert!(!out.contains(".unused"));
        assert!(out.contains(".dropdown-menu"));
        assert!(tally.filtered < tally.original);
    }

    #[test]
    fn test_keyframes_always_kept() {
        let dom = MockDom::new("https://example.com/");
        let (out, tally) = walk(&dom, "@keyframes spin { from { opacity: 0; } to { opacity: 1; } } .gone { color: red; }");
        assert!(out.contains("@keyframes spin"));
        assert!(!out.contains(".gone"));
        assert_eq!(tally.filtered, 0);
        assert_eq!(tally.reduction(), 100.0);
    }

    #[test]
    fn test_font_face_kept_only_when_referenced() {
        let dom = MockDom::new("https://example.com/");
        let css = r#"
            @font-face { font-family: "Open Sans"; src: url(open-sans.woff2); }
            @font-face { font-family: "Unused Face"; src: url(unused.woff2); }
            .body-text { font-family: "Open Sans", sans-serif; }
        "#;
        let (out, _) = walk(&dom, css);
        assert!(out.contains("Open Sans"));
        assert!(!out.contains("Unused Face"));
    }

    #[test]
    fn test_media_blocks_hold_only_used_rules() {
        let dom = MockDom::new("https://example.com/").with_matches(".wide", &[0]);
        let css = "@media (min-width: 800px) { .wide { display: flex; } .narrow { display: block; } } \
                   @media print { .narrow { display: none; } }";
        let (out, tally) = walk(&dom, css);
        assert_eq!(out.matches("@media").count(), 1);
        assert!(out.contains(".wide"));
        assert!(!out.contains(".narrow"));
        assert_eq!(tally, Tally::default());
    }

    #[test]
    fn test_other_at_rules_are_dropped() {
        let dom = MockDom::new("https://example.com/").with_matches(".a", &[0]);
        let (out, _) = walk(&dom, "@supports (display: grid) { .a { display: grid; } } @page { margin: 1cm; }");
        assert!(out.is_empty());
    }

    #[test]
    fn test_nothing_used_gives_empty_text() {
        let dom = MockDom::new("https://example.com/");
        let (out, _) = walk(&dom, ".a { color: red; }");
        assert_eq!(out, "");
    }

    #[test]
    fn test_private_use_content_is_escaped() {
        let dom = MockDom::new("https://example.com/").with_matches(".icon", &[0]).with_pseudo_style(
            0,
            "before",
            "\"\u{f101}\"",
            "inline",
        );
        let (out, _) = walk(&dom, r#".icon::before { content: "\f101"; }"#);
        assert!(out.contains(r"\f101"));
        assert!(!out.contains('\u{f101}'));

        // The escape reads back as the same glyph.
        let reparsed = sheet(&out);
        let Rule::Style(rule) = &reparsed.rules[0] else { panic!("expected a style rule") };
        assert!(rule.declared("content").unwrap().value.contains('\u{f101}'));
    }

    #[tokio::test]
    async fn test_imported_references_keep_their_directory() {
        let loader = MockLoader::default().with(
            "https://example.com/parts/nav.css",
            ".menu { background: url(img/bg.png); } @font-face { font-family: Icons; src: url(../fonts/icons.woff2); } \
             .menu-icon { font-family: Icons; }",
        );
        let mut theme = sheet("@import 'parts/nav.css'; .hero { background: url(img/hero.png); }");
        theme.load_imports(&loader).await;
        let dom = MockDom::new("https://example.com/").with_matches(".menu", &[0]).with_matches(".hero", &[1]);
        let patterns = IncludePatterns::default();
        let out = StylesheetWalker::new(&dom, SelectorMatcher::default(), &patterns).walk(&theme);

        assert!(out.contains("https://example.com/parts/img/bg.png"), "{out}");
        assert!(out.contains("https://example.com/fonts/icons.woff2"), "{out}");
        // The importing sheet's own references are left for the cache to resolve.
        assert!(out.contains("img/hero.png") && !out.contains("https://example.com/img/hero.png"), "{out}");
    }

    #[rstest]
    #[case("\"\u{f101}\"", "\"\\f101\"")]
    #[case("\"\u{e000}a\"", "\"\\e000 a\"")]
    #[case("\"\u{f8ff}z\"", "\"\\f8ffz\"")]
    #[case("\"plain\"", "\"plain\"")]
    fn test_escape_private_use(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_private_use(input), expected);
    }

    #[rstest]
    #[case(0, 0, 0.0)]
    #[case(200, 50, 75.0)]
    #[case(100, 100, 0.0)]
    fn test_reduction(#[case] original: usize, #[case] filtered: usize, #[case] expected: f64) {
        assert_eq!(Tally { original, filtered }.reduction(), expected);
    }
}
