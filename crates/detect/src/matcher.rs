//! Decides whether a selector is in use on a document.

use crate::consts::{
    DYNAMIC_PSEUDO_CLASS_REGEX, EMPTY_FUNCTIONAL_PSEUDO_REGEX, PSEUDO_ELEMENT_REGEX, STATE_PSEUDO_CLASS_REGEX,
    TRAILING_COMMA_REGEX, TRAILING_PSEUDO_REGEX,
};
use crate::dom::Dom;
use crate::error::Result;

/// Pseudo-elements that CSS 2 wrote with a single colon.
const LEGACY_PSEUDO_ELEMENTS: [&str; 4] = ["before", "after", "first-line", "first-letter"];

/// The part of a selector that can be queried against elements, and the
/// pseudo-element it styles, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTarget {
    pub base: String,
    pub pseudo_element: Option<String>,
}

impl MatchTarget {
    pub fn new(selector: &str) -> Self {
        let cleaned = strip_not(selector);
        let cleaned = TRAILING_COMMA_REGEX.replace(&cleaned, "");
        let cleaned = DYNAMIC_PSEUDO_CLASS_REGEX.replace_all(&cleaned, "");
        let cleaned = STATE_PSEUDO_CLASS_REGEX.replace_all(&cleaned, "");
        let cleaned = EMPTY_FUNCTIONAL_PSEUDO_REGEX.replace_all(&cleaned, "");
        let cleaned = cleaned.trim();

        let (base, pseudo_element) = match TRAILING_PSEUDO_REGEX.captures(cleaned) {
            Some(captures) => {
                let name = captures[2].to_ascii_lowercase();
                let is_element = &captures[1] == "::" || LEGACY_PSEUDO_ELEMENTS.contains(&name.as_str());
                match (is_element, captures.get(0)) {
                    (true, Some(whole)) => (&cleaned[..whole.start()], Some(name)),
                    _ => (cleaned, None),
                }
            },
            None => (cleaned, None),
        };
        // Pseudo-elements left in other branches of a list never match an
        // element, but the selector engine would refuse the whole list.
        let base = PSEUDO_ELEMENT_REGEX.replace_all(base, "");
        Self { base: complete(&base), pseudo_element }
    }
}

/// Tests selectors against a [`Dom`], failing closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectorMatcher {
    log_warnings: bool,
}

impl SelectorMatcher {
    pub fn new(log_warnings: bool) -> Self {
        Self { log_warnings }
    }

    /// Whether `selector` styles anything on `dom`. Selectors the engine does
    /// not understand are reported as unused.
    pub fn matches<D: Dom>(&self, selector: &str, dom: &D) -> bool {
        match try_matches(selector, dom) {
            Ok(used) => used,
            Err(err) => {
                match self.log_warnings {
                    true => tracing::warn!(selector, error = %err, "could not test selector"),
                    false => tracing::debug!(selector, error = %err, "could not test selector"),
                }
                false
            },
        }
    }
}

/// Like [`SelectorMatcher::matches`], but returning the engine's complaint.
pub fn try_matches<D: Dom>(selector: &str, dom: &D) -> Result<bool> {
    if selector.trim() == ":root" {
        return Ok(true);
    }
    let target = MatchTarget::new(selector);
    let nodes = dom.query_selector_all(&target.base)?;
    if nodes.is_empty() {
        return Ok(false);
    }
    let Some(pseudo) = target.pseudo_element else {
        return Ok(true);
    };
    Ok(nodes.into_iter().any(|node| dom.computed_style(node, &pseudo).renders()))
}

/// Remove every `:not(...)` group, honouring nested parentheses.
fn strip_not(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut rest = selector;
    while let Some(start) = rest.find(":not(") {
        out.push_str(&rest[..start]);
        let mut depth = 0usize;
        let mut end = rest.len();
        for (offset, ch) in rest[start..].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + offset + 1;
                        break;
                    }
                },
                _ => {},
            }
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Give a compound-less selector (`""`, `"ul > "`) something to match.
fn complete(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.is_empty() {
        return "*".to_string();
    }
    match base.ends_with(|c: char| c.is_whitespace() || matches!(c, '>' | '+' | '~')) {
        true => format!("{}*", base.trim_start()),
        false => trimmed.to_string(),
    }
}
