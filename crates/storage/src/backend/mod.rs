//! Storage backend trait and implementations.
//!
//! The cache tree is a plain directory of content-addressed stylesheets and
//! per-page manifests. [`StorageBackend`] hides where that directory lives so
//! the cache logic can be exercised against [`MockBackend`] in tests.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All paths are relative to the storage root and are validated with
/// [`validate_path`](crate::validate_path) by every implementation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ucss_storage::{backend::StorageBackend, error::Result};
///
/// async fn read_manifest(backend: &dyn StorageBackend) -> Result<Option<Vec<u8>>> {
///     let path = Path::new("blog/lookup.json");
///     if backend.exists(path).await? {
///         Ok(Some(backend.read(path).await?))
///     } else {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream every file below the root (recursively), or only
    /// those whose path starts with `prefix` (component-wise).
    ///
    /// Listing a directory that does not exist yields nothing rather than an
    /// error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use ucss_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}", info.path.display());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file.
    ///
    /// Parent directories are created as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Write file contents only if no file exists at `path`.
    ///
    /// Returns `true` if this call created the file and `false` if it was
    /// already present, in which case the existing content is left alone.
    /// Two writers racing on the same path both succeed; exactly one of them
    /// observes `true`. Readers never see a partially written file, and a
    /// failed write leaves nothing behind.
    async fn create_new(&self, path: &Path, data: &[u8]) -> Result<bool>;

    /// Delete everything below the root, leaving the (empty) root in place.
    async fn clear(&self) -> Result<()>;
}
