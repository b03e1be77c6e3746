//! Listing entries returned by storage backends.

use std::path::{Path, PathBuf};

/// A stored file, as reported by listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Final path component, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// Directory containing the file, relative to the storage root. Files at
    /// the root return an empty path.
    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Whether the file lives directly in the storage root.
    pub fn is_top_level(&self) -> bool {
        self.parent().as_os_str().is_empty()
    }
}
