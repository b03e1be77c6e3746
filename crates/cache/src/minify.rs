use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use ucss_detect::walker::escape_private_use;

/// Shrinks CSS text before it is hashed and stored.
pub trait Minifier: Send + Sync {
    /// Never fails: text that cannot be minified is returned as it was.
    fn minify(&self, css: &str) -> String;
}

/// Minifies with `lightningcss`, keeping rules it cannot parse.
///
/// The printer decodes escapes such as `\f101`, so private-use characters
/// are escaped again afterwards.
#[derive(Clone, Copy, Debug, Default)]
pub struct LightningMinifier;

impl Minifier for LightningMinifier {
    fn minify(&self, css: &str) -> String {
        let minified = match minify_css(css) {
            Ok(minified) => minified,
            Err(e) => {
                tracing::warn!(error = %e, size = css.len(), "could not minify stylesheet, storing it as is");
                css.to_string()
            },
        };
        escape_private_use(&minified)
    }
}

fn minify_css(css: &str) -> Result<String, String> {
    let options = ParserOptions { error_recovery: true, ..ParserOptions::default() };
    let mut sheet = StyleSheet::parse(css, options).map_err(|e| e.to_string())?;
    sheet.minify(MinifyOptions::default()).map_err(|e| e.to_string())?;
    let printed = sheet.to_css(PrinterOptions { minify: true, ..PrinterOptions::default() }).map_err(|e| e.to_string())?;
    Ok(printed.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{EMPTY_FILE_NAME, content_file_name};

    #[test]
    fn test_minifies() {
        let minified = LightningMinifier.minify(".a {\n  color: #ff0000;\n}\n\n.b { margin: 0px 0px 0px 0px; }\n");
        assert!(!minified.contains('\n'));
        assert!(minified.len() < 30, "{minified}");
        assert!(minified.contains(".a{"));
    }

    #[test]
    fn test_blank_text_becomes_the_empty_entry() {
        assert_eq!(content_file_name(&LightningMinifier.minify("")), *EMPTY_FILE_NAME);
        assert_eq!(content_file_name(&LightningMinifier.minify("\n  \n")), *EMPTY_FILE_NAME);
    }

    #[test]
    fn test_private_use_stays_escaped() {
        let minified = LightningMinifier.minify(".i::before { content: \"\\f101\"; } .j::after { content: \"\\e000 a\"; }");
        assert!(minified.contains(r"\f101"), "{minified}");
        assert!(minified.contains(r"\e000 a"), "{minified}");
        assert!(!minified.contains('\u{f101}'));
        assert!(!minified.contains('\u{e000}'));
    }

    #[test]
    fn test_keeps_url_references() {
        let minified = LightningMinifier.minify(".hero { background: url(\"img/hero.png\"); }");
        assert!(minified.contains("img/hero.png"));
    }
}
