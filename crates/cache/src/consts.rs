use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Markup.
// The tag name is ASCII-only so `open` is always the five bytes of `<link`.
regex!(
    STYLESHEET_LINK_REGEX,
    r#"(?P<open>(?i-u:<link))(?i)[^>]*\srel=['"]stylesheet['"][^>]*\shref=['"](?P<href>[^'"]+)['"][^>]*>"#
);
regex!(HTML_DOCUMENT_REGEX, r"(?i)<html");

// Body classes too specific to group pages by.
regex!(EXCLUDED_POST_TYPE_REGEX, r"home|-(?:template|id|child|parent)");
