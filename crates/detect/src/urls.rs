use crate::consts::URL_REFERENCE_REGEX;
use regex::Captures;
use url::Url;

/// Resolve relative `url(...)` and `@import "..."` references in `css`
/// against `base`, the URL the stylesheet was originally served from.
///
/// Rebuilt text ends up somewhere other than where it was served from (an
/// imported sheet inlined into its parent, a cached copy), so anything
/// relative would otherwise point at the wrong place. Absolute URLs, `data:` URIs and
/// fragment-only references (`#filter`) are left as they are.
pub fn absolutize(css: &str, base: &Url) -> String {
    URL_REFERENCE_REGEX
        .replace_all(css, |captures: &Captures| {
            let (Some(whole), Some(reference)) = (captures.get(0), captures.get(1).or_else(|| captures.get(2))) else {
                return captures[0].to_string();
            };
            let relative = reference.as_str().trim_end();
            let Some(absolute) = resolve(relative, base) else {
                return whole.as_str().to_string();
            };
            let start = reference.start() - whole.start();
            let end = start + relative.len();
            format!("{}{}{}", &whole.as_str()[..start], absolute, &whole.as_str()[end..])
        })
        .into_owned()
}

fn resolve(reference: &str, base: &Url) -> Option<Url> {
    if reference.is_empty() || reference.starts_with('#') || Url::parse(reference).is_ok() {
        return None;
    }
    base.join(reference).ok()
}
