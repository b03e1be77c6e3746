//! Local filesystem storage backend.
//!
//! Files are stored below a configured directory and accessed with
//! `tokio::fs`.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry, OpenOptions};
use tokio::io::AsyncWriteExt;

const TEMP_SUFFIX: &str = ".tmp";
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use ucss_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("cache", "/var/www/wp-content/cache/acd-unused-css/example.com")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend rooted at `root`, creating the
    /// directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Sync on purpose: happens once at startup.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Absolute directory this backend writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    // Keeps `?` usable inside the listing stream.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if file_type.is_dir() {
            // Descend while the directory could still contain matches.
            return Ok(match prefix {
                Some(pfx) if !relative.starts_with(pfx) && !pfx.starts_with(&relative) => WalkEntry::Skip,
                _ => WalkEntry::Descend(path),
            });
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if file_type.is_file() {
            return Ok(WalkEntry::File(FileInfo::new(relative)));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    /// Hidden sibling of `abs_path`, unique within this process.
    fn temp_path(abs_path: &Path) -> PathBuf {
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let file_name = abs_path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
        abs_path.with_file_name(format!(".{file_name}.{}.{sequence}{TEMP_SUFFIX}", std::process::id()))
    }

    async fn write_temp(temp_path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }

    async fn ensure_parent(&self, abs_path: &Path, path: &Path) -> Result<()> {
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        self.ensure_parent(&abs_path, path).await?;
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn create_new(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        if fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)? {
            return Ok(false);
        }
        self.ensure_parent(&abs_path, path).await?;
        // The complete file is linked into place, so the target either does
        // not exist or holds all of `data`.
        let temp_path = Self::temp_path(&abs_path);
        if let Err(e) = Self::write_temp(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            exn::bail!(Self::map_io_error(e, path));
        }
        let linked = fs::hard_link(&temp_path, &abs_path).await;
        if let Err(e) = fs::remove_file(&temp_path).await {
            tracing::warn!(temp = %temp_path.display(), error = %e, "could not remove temporary file");
        }
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => exn::bail!(Self::map_io_error(e, path)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => exn::bail!(Self::map_io_error(e, &self.root)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &self.root))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
            let removed = match file_type.is_dir() {
                true => fs::remove_dir_all(&path).await,
                false => fs::remove_file(&path).await,
            };
            match removed {
                Ok(()) => {},
                // Someone else got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => exn::bail!(Self::map_io_error(e, &path)),
            }
        }
        tracing::info!(backend = %self.name, root = %self.root.display(), "cleared storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("cache", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("cache", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("cache", "relative/path").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("acd-unused-css/example.com");
        let backend = LocalBackend::new("cache", &root).unwrap();
        assert!(root.is_dir());
        assert_eq!(backend.root(), root);
    }

    #[test]
    fn test_absolute_path_rejects_traversal() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("blog/lookup.json");
        assert_eq!(backend.absolute_path("/blog/lookup.json").unwrap(), expected);
        assert!(backend.absolute_path("../wp-config.php").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("a/b/lookup.json"), b"{}").await.unwrap();
        assert_eq!(backend.read(Path::new("a/b/lookup.json")).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_create_new_keeps_first_content() {
        let (_temp_dir, backend) = backend();
        assert!(backend.create_new(Path::new("abc.css"), b".a{}").await.unwrap());
        assert!(!backend.create_new(Path::new("abc.css"), b".b{}").await.unwrap());
        assert_eq!(backend.read(Path::new("abc.css")).await.unwrap(), b".a{}");
    }

    #[tokio::test]
    async fn test_create_new_concurrent_writers_converge() {
        let (_temp_dir, backend) = backend();
        let path = Path::new("same.css");
        let (a, b) = tokio::join!(backend.create_new(path, b"x{}"), backend.create_new(path, b"x{}"));
        assert!(a.unwrap() ^ b.unwrap());
        assert_eq!(backend.read(path).await.unwrap(), b"x{}");
    }

    #[tokio::test]
    async fn test_create_new_leaves_no_partial_files() {
        let (temp_dir, backend) = backend();
        assert!(backend.create_new(Path::new("abc.css"), b".a{}").await.unwrap());
        assert!(!backend.create_new(Path::new("abc.css"), b".b{}").await.unwrap());
        // The parent "directory" is a file, so nothing can be written below it.
        assert!(backend.create_new(Path::new("abc.css/def.css"), b".c{}").await.is_err());
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["abc.css"]);
    }

    #[tokio::test]
    async fn test_clear_keeps_root() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("abc.css"), b"x").await.unwrap();
        backend.write(Path::new("blog/post/lookup.json"), b"{}").await.unwrap();
        backend.clear().await.unwrap();
        assert!(temp_dir.path().is_dir());
        assert!(backend.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_recurses() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("a.css"), b"x").await.unwrap();
        backend.write(Path::new("lookup.json"), b"{}").await.unwrap();
        backend.write(Path::new("blog/lookup.json"), b"{}").await.unwrap();
        backend.write(Path::new("blog/post/lookup.json"), b"{}").await.unwrap();
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("shop/cart/lookup.json"), b"{}").await.unwrap();
        backend.write(Path::new("shop/cart-old/lookup.json"), b"{}").await.unwrap();
        backend.write(Path::new("blog/lookup.json"), b"{}").await.unwrap();
        let files = backend.list(Some(Path::new("shop/cart"))).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("shop/cart/lookup.json"));
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let (_temp_dir, backend) = backend();
        assert!(backend.list(Some(Path::new("nonexistent/"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.create_new(Path::new("a/../../b.css"), b"data").await.is_err());
    }
}
