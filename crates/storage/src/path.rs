//! Path validation.
//!
//! Every path handed to a backend is relative to the backend root. Page
//! directories are derived from request URLs, which are attacker controlled,
//! so nothing may resolve outside the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns its normalized form.
///
/// `.` components, repeated separators and a leading `/` are dropped; `..`
/// is resolved lexically and rejected if it would leave the root. Null bytes
/// and Windows prefixes are rejected, as is a path that normalizes to
/// nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ucss_storage::validate_path;
///
/// assert!(validate_path("blog/hello-world/lookup.json").is_ok());
/// assert!(validate_path("/blog/../about/lookup.json").is_ok());
/// assert!(validate_path("../wp-config.php").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("//blog/./hello-world//lookup.json").unwrap(),
///     Path::new("blog/hello-world/lookup.json")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Path::components() lets null bytes through on Unix.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}
