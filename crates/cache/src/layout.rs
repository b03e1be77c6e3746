//! Where things live inside a site's cache directory.
//!
//! ```text
//! <hostname>/
//! ├── 9f86d0….css          content-addressed, write-once
//! ├── lookup.json          manifest for `/`
//! └── blog/hello-world/
//!     └── lookup.json      manifest for `/blog/hello-world/`
//! ```

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use ucss_storage::validate_path;
use url::Url;

pub const MANIFEST_FILE: &str = "lookup.json";

/// File name of the entry holding no CSS at all.
pub static EMPTY_FILE_NAME: LazyLock<String> = LazyLock::new(|| content_file_name(""));

/// `<blake3 hex>.css` for `css`.
pub fn content_file_name(css: &str) -> String {
    format!("{}.css", blake3::hash(css.as_bytes()).to_hex())
}

/// Whether `file_name` is the entry for a sheet where nothing matched.
pub fn is_empty_entry(file_name: &str) -> bool {
    file_name == EMPTY_FILE_NAME.as_str()
}

/// Directory for the page at `url`, relative to the site's cache directory.
/// The site root maps to the cache directory itself (an empty path).
pub fn page_dir(url: &Url) -> Result<PathBuf> {
    let path = url.path().trim_matches('/');
    if path.is_empty() {
        return Ok(PathBuf::new());
    }
    validate_path(path).or_raise(|| ErrorKind::InvalidUrl(url.to_string()))
}

pub fn manifest_path(url: &Url) -> Result<PathBuf> {
    Ok(page_dir(url)?.join(MANIFEST_FILE))
}

/// Human-facing key for a page directory: `/` for the root, otherwise the
/// slash-separated relative path.
pub fn page_key(dir: &Path) -> String {
    let segments: Vec<_> = dir.components().map(|c| c.as_os_str().to_string_lossy()).collect();
    match segments.is_empty() {
        true => "/".to_string(),
        false => segments.join("/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_content_file_name() {
        let name = content_file_name(".a{color:red}");
        assert_eq!(name.len(), 64 + 4);
        assert!(name.ends_with(".css"));
        assert_eq!(name, content_file_name(".a{color:red}"));
        assert_ne!(name, content_file_name(".b{color:red}"));
        assert!(is_empty_entry(&content_file_name("")));
        assert!(!is_empty_entry(&name));
    }

    #[rstest]
    #[case("https://example.com/", "lookup.json")]
    #[case("https://example.com", "lookup.json")]
    #[case("https://example.com/blog/hello-world/", "blog/hello-world/lookup.json")]
    #[case("https://example.com/shop/cart?add=12#top", "shop/cart/lookup.json")]
    #[case("https://example.com/a/../b/", "b/lookup.json")]
    fn test_manifest_path(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(manifest_path(&Url::parse(url).unwrap()).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("", "/")]
    #[case("blog", "blog")]
    #[case("blog/hello-world", "blog/hello-world")]
    fn test_page_key(#[case] dir: &str, #[case] expected: &str) {
        assert_eq!(page_key(Path::new(dir)), expected);
    }
}
