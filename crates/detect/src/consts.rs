use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

const SUFFIX: &str = "(?:-[a-zA-Z0-9_-]+)?";

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Document structure.
selector!(STYLESHEET_SELECTOR, "link[rel][href], style");
selector!(BODY_SELECTOR, "body");

// Body classes that describe the kind of page being viewed.
regex!(
    POST_TYPE_REGEX,
    format!(
        r"^(?:rtl|home|blog|privacy-policy|archive|date|search{s}|paged|attachment|error404|[a-zA-Z0-9_-]+-template|single{s}|page{s}|post-type-archive{s}|author{s}|category{s}|tag{s}|tax{s}|term{s})$",
        s = SUFFIX
    )
    .as_str()
);
regex!(POST_ID_REGEX, r"^(?:postid|page-id)-(.+)$");

// Selector clean-up. Longer names come first so `:focus` does not eat the
// start of `:focus-within`.
regex!(DYNAMIC_PSEUDO_CLASS_REGEX, r":(?:focus-within|focus-visible|hover|active|focus|visited)");
// Element states a static document cannot express.
regex!(
    STATE_PSEUDO_CLASS_REGEX,
    r":(?:placeholder-shown|indeterminate|out-of-range|read-write|read-only|any-link|in-range|checked|disabled|enabled|required|optional|invalid|target|valid|link)"
);
regex!(TRAILING_COMMA_REGEX, r",\s*$");
regex!(TRAILING_PSEUDO_REGEX, r"(::?)([\w-]+)$");
regex!(PSEUDO_ELEMENT_REGEX, r"::[\w-]+|:(?:before|after|first-line|first-letter)");
regex!(EMPTY_FUNCTIONAL_PSEUDO_REGEX, r":(?:is|where|matches|-webkit-any)\(\s*\)");

// References inside stylesheets that are relative to the sheet.
regex!(URL_REFERENCE_REGEX, r#"url\(\s*['"]?([^'")]+)['"]?\s*\)|@import\s+['"]([^'"]+\.[^\s]+)['"]"#);
