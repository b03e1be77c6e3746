//! An owned, simplified object model of a parsed stylesheet.
//!
//! Parsing is done by `lightningcss`; the result is flattened into [`Rule`]s
//! holding serialized text so nothing borrows from the source afterwards.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use lightningcss::printer::PrinterOptions;
use lightningcss::properties::Property;
use lightningcss::properties::font::FontFamily;
use lightningcss::rules::CssRule;
use lightningcss::rules::font_face::FontFaceProperty;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};
use lightningcss::traits::ToCss;
use tracing::instrument;
use url::Url;

/// Nested `@import`s deeper than this are left unresolved.
const MAX_IMPORT_DEPTH: usize = 8;

/// Fetches stylesheet text.
#[async_trait]
pub trait StylesheetLoader: Send + Sync {
    async fn load(&self, url: &Url) -> Result<String>;
}

/// A stylesheet attached to a document.
#[derive(Clone, Debug, Default)]
pub struct Stylesheet {
    /// Absolute URL the sheet was loaded from. `None` for inline `<style>`.
    pub href: Option<Url>,
    /// The owner node carries `data-ucss-processed="true"`.
    pub processed: bool,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug)]
pub enum Rule {
    Style(StyleRule),
    Media {
        /// Media query list, without the `@media` keyword.
        query: String,
        rules: Vec<Rule>,
    },
    Import {
        /// The URL as written in the source.
        url: String,
        /// The imported sheet, once loaded.
        sheet: Option<Box<Stylesheet>>,
    },
    Keyframes {
        css_text: String,
    },
    FontFace {
        /// Unquoted family names declared by the rule.
        families: Vec<String>,
        css_text: String,
    },
    /// Every other at-rule.
    Other {
        css_text: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleRule {
    pub selector_text: String,
    pub declarations: Vec<Declaration>,
    /// Unquoted families named by `font-family` or the `font` shorthand.
    pub font_families: Vec<String>,
    pub css_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl Stylesheet {
    /// Parse `text`. Rules the parser cannot make sense of are dropped; only a
    /// sheet that cannot be tokenized at all is an error. `@import`s are left
    /// unresolved, see [`load_imports`](Self::load_imports).
    #[instrument(skip(text), fields(href = href.as_ref().map(Url::as_str), size = text.len()))]
    pub fn parse(text: &str, href: Option<Url>, processed: bool) -> Result<Self> {
        let options = ParserOptions { error_recovery: true, ..ParserOptions::default() };
        let sheet = StyleSheet::parse(text, options).map_err(|e| ErrorKind::Stylesheet(e.to_string()))?;
        let rules = sheet.rules.0.iter().filter_map(convert).collect();
        Ok(Self { href, processed, rules })
    }

    /// Load every `@import` (recursively) through `loader`, resolving relative
    /// URLs against this sheet's href. Failures are logged and leave the
    /// import empty.
    pub async fn load_imports(&mut self, loader: &dyn StylesheetLoader) {
        let base = self.href.clone();
        load_imports(&mut self.rules, base, loader, 0).await;
    }

    /// Every rule, descending into `@media` blocks and loaded imports.
    pub fn all_rules(&self) -> Vec<&Rule> {
        fn push<'a>(rules: &'a [Rule], out: &mut Vec<&'a Rule>) {
            for rule in rules {
                out.push(rule);
                match rule {
                    Rule::Media { rules, .. } => push(rules, out),
                    Rule::Import { sheet: Some(sheet), .. } => push(&sheet.rules, out),
                    _ => {},
                }
            }
        }
        let mut out = Vec::new();
        push(&self.rules, &mut out);
        out
    }
}

impl StyleRule {
    /// Last value declared for `name`, with `!important` taking precedence.
    pub fn declared(&self, name: &str) -> Option<&Declaration> {
        let mut found: Option<&Declaration> = None;
        for declaration in self.declarations.iter().filter(|d| d.name == name) {
            if found.is_none_or(|current| declaration.important || !current.important) {
                found = Some(declaration);
            }
        }
        found
    }
}

fn load_imports<'a>(
    rules: &'a mut [Rule],
    base: Option<Url>,
    loader: &'a dyn StylesheetLoader,
    depth: usize,
) -> BoxFuture<'a, ()> {
    async move {
        for rule in rules.iter_mut() {
            let Rule::Import { url, sheet } = rule else {
                continue;
            };
            if depth >= MAX_IMPORT_DEPTH {
                tracing::warn!(%url, depth, "import nested too deeply, skipping");
                continue;
            }
            let resolved = match &base {
                Some(base) => base.join(url),
                None => Url::parse(url),
            };
            let resolved = match resolved {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "could not resolve import");
                    continue;
                },
            };
            let text = match loader.load(&resolved).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(url = %resolved, error = ?e, "could not load import");
                    continue;
                },
            };
            match Stylesheet::parse(&text, Some(resolved), false) {
                Ok(mut imported) => {
                    let href = imported.href.clone();
                    load_imports(&mut imported.rules, href, loader, depth + 1).await;
                    *sheet = Some(Box::new(imported));
                },
                Err(e) => tracing::warn!(%url, error = ?e, "could not parse import"),
            }
        }
    }
    .boxed()
}

fn print<T: ToCss>(value: &T) -> Option<String> {
    match value.to_css_string(PrinterOptions::default()) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(error = %e, "could not serialize rule");
            None
        },
    }
}

/// Text before the opening brace of a printed block rule.
fn prelude(css_text: &str) -> &str {
    css_text.split_once('{').map_or(css_text, |(prelude, _)| prelude).trim()
}

fn unquote(value: &str) -> String {
    value.trim().replace(['"', '\''], "").trim().to_string()
}

fn family_names(families: &[FontFamily]) -> Vec<String> {
    families.iter().filter_map(print).map(|family| unquote(&family)).filter(|f| !f.is_empty()).collect()
}

fn convert(rule: &CssRule) -> Option<Rule> {
    match rule {
        CssRule::Style(style) => {
            let css_text = print(rule)?;
            let mut declarations = Vec::new();
            let mut font_families = Vec::new();
            let blocks = [(&style.declarations.declarations, false), (&style.declarations.important_declarations, true)];
            for (properties, important) in blocks {
                for property in properties {
                    match property {
                        Property::FontFamily(families) => font_families.extend(family_names(families)),
                        Property::Font(font) => font_families.extend(family_names(&font.family)),
                        _ => {},
                    }
                    let Ok(value) = property.value_to_css_string(PrinterOptions::default()) else {
                        continue;
                    };
                    declarations.push(Declaration { name: property.property_id().name().to_string(), value, important });
                }
            }
            Some(Rule::Style(StyleRule {
                selector_text: prelude(&css_text).to_string(),
                declarations,
                font_families,
                css_text,
            }))
        },
        CssRule::Media(media) => {
            let css_text = print(rule)?;
            let query = prelude(&css_text).trim_start_matches("@media").trim().to_string();
            Some(Rule::Media { query, rules: media.rules.0.iter().filter_map(convert).collect() })
        },
        CssRule::Import(import) => {
            let url: &str = &import.url;
            Some(Rule::Import { url: url.to_string(), sheet: None })
        },
        CssRule::Keyframes(_) => Some(Rule::Keyframes { css_text: print(rule)? }),
        CssRule::FontFace(font_face) => {
            let mut families = Vec::new();
            for property in &font_face.properties {
                if let FontFaceProperty::FontFamily(family) = property {
                    families.extend(family_names(std::slice::from_ref(family)));
                }
            }
            Some(Rule::FontFace { families, css_text: print(rule)? })
        },
        _ => Some(Rule::Other { css_text: print(rule)? }),
    }
}

/// Serves stylesheets from memory, keyed by absolute URL.
#[cfg(any(test, feature = "mock"))]
#[derive(Clone, Debug, Default)]
pub struct MockLoader {
    sheets: std::collections::HashMap<String, String>,
}

#[cfg(any(test, feature = "mock"))]
impl MockLoader {
    pub fn with(mut self, url: &str, css: &str) -> Self {
        self.sheets.insert(url.to_string(), css.to_string());
        self
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl StylesheetLoader for MockLoader {
    async fn load(&self, url: &Url) -> Result<String> {
        match self.sheets.get(url.as_str()) {
            Some(css) => Ok(css.clone()),
            None => exn::bail!(ErrorKind::Load(url.to_string())),
        }
    }
}
