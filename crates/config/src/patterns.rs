//! Include patterns: selectors matching any of these are always kept.
//!
//! Used for classes toggled by scripts (`.dropdown`, `.is-open`) that a
//! static look at the document cannot observe.

use crate::error::{ErrorKind, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Applied when no patterns are configured.
pub const DEFAULT_INCLUDE_PATTERNS: [&str; 2] = [r"^\.hover", r"\.dropdown"];

/// How patterns may be written in a configuration source.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum PatternSource {
    /// One pattern per line, as typed into a textarea.
    Text(String),
    List(Vec<String>),
}

/// Ordered, compiled include patterns.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "PatternSource", into = "PatternSource")]
pub struct IncludePatterns {
    sources: Vec<String>,
    compiled: Vec<Regex>,
}

impl IncludePatterns {
    /// Compile `patterns` in order.
    ///
    /// Doubled backslashes (an artefact of patterns that went through JSON
    /// escaping twice) are collapsed to single ones, surrounding whitespace
    /// is trimmed and blank entries are dropped. When nothing is left the
    /// [defaults](DEFAULT_INCLUDE_PATTERNS) apply. The first pattern that
    /// fails to compile is an error.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sources: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().replace(r"\\", r"\"))
            .filter(|p| !p.is_empty())
            .collect();
        if sources.is_empty() {
            sources = DEFAULT_INCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect();
        }
        let compiled = sources
            .iter()
            .map(|source| Regex::new(source).map_err(|e| ErrorKind::InvalidPattern(format!("`{source}`: {e}"))))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { sources, compiled })
    }

    /// Parse newline-separated patterns.
    pub fn parse(text: &str) -> Result<Self> {
        Self::new(text.lines())
    }

    /// Whether any pattern matches `selector`.
    pub fn matches(&self, selector: &str) -> bool {
        self.compiled.iter().any(|pattern| pattern.is_match(selector))
    }

    /// Normalized pattern sources, in order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

impl Default for IncludePatterns {
    fn default() -> Self {
        let compiled = DEFAULT_INCLUDE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("default include patterns are valid"))
            .collect();
        Self {
            sources: DEFAULT_INCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            compiled,
        }
    }
}

impl TryFrom<PatternSource> for IncludePatterns {
    type Error = ErrorKind;
    fn try_from(source: PatternSource) -> std::result::Result<Self, Self::Error> {
        let parsed = match source {
            PatternSource::Text(text) => Self::parse(&text),
            PatternSource::List(list) => Self::new(list),
        };
        parsed.map_err(|err| (*err).clone())
    }
}

impl From<IncludePatterns> for PatternSource {
    fn from(patterns: IncludePatterns) -> Self {
        PatternSource::List(patterns.sources)
    }
}
