use crate::error::{ErrorKind, Result};
use crate::invalidate::{Invalidator, NoopInvalidator};
use crate::layout::{MANIFEST_FILE, content_file_name, manifest_path};
use crate::manifest::CacheManifest;
use crate::minify::{LightningMinifier, Minifier};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;
use ucss_config::Config;
use ucss_detect::urls::absolutize;
use ucss_detect::{StylesheetUsageReport, TransmissionEnvelope};
use ucss_storage::BackendHandle;
use ucss_storage::backend::{LocalBackend, StorageBackend};
use url::Url;

/// File counts for the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    /// Content-addressed files, which all live at the top level.
    pub num_css_files: usize,
    /// Manifests at any depth.
    pub num_lookup_files: usize,
}

/// Content-addressed store for reduced stylesheets plus one manifest per
/// page, all below a single site directory.
///
/// Entries are written once and never modified; concurrent writers of the
/// same content both succeed. Manifests are replaced wholesale, so the last
/// writer for a page wins.
#[derive(Clone)]
pub struct CacheStore {
    backend: BackendHandle,
    minifier: Arc<dyn Minifier>,
    invalidator: Arc<dyn Invalidator>,
    purge_dirs: Vec<PathBuf>,
}

impl CacheStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            minifier: Arc::new(LightningMinifier),
            invalidator: Arc::new(NoopInvalidator),
            purge_dirs: Vec::new(),
        }
    }

    /// Store on the local filesystem at [`Config::cache_path`], purging the
    /// configured integration directories on [`clear`](Self::clear).
    pub fn from_config(config: &Config) -> Result<Self> {
        let root = config.cache_path().or_raise(|| ErrorKind::Config)?;
        let root = std::path::absolute(&root).or_raise(|| ErrorKind::Config)?;
        let backend = LocalBackend::new("cache", root).or_raise(|| ErrorKind::Storage)?;
        Ok(Self::new(Arc::new(backend)).with_purge_dirs(config.integrations.purge_dirs.clone()))
    }

    pub fn with_minifier(mut self, minifier: Arc<dyn Minifier>) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn Invalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    pub fn with_purge_dirs(mut self, purge_dirs: Vec<PathBuf>) -> Self {
        self.purge_dirs = purge_dirs;
        self
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    /// File a transmitted report.
    pub async fn accept(&self, envelope: &TransmissionEnvelope) -> Result<CacheManifest> {
        self.process(&envelope.css, &envelope.url, envelope.post_id.as_deref(), &envelope.post_types).await
    }

    /// Minify, absolutize and store every sheet of `report`, then write the
    /// manifest for `page_url`.
    ///
    /// Storage failures abort before the manifest is written, leaving any
    /// previous manifest for the page in place. A failing invalidator is only
    /// logged.
    #[instrument(skip(self, report, post_types), fields(backend = self.backend.name(), sheets = report.len()))]
    pub async fn process(
        &self,
        report: &StylesheetUsageReport,
        page_url: &str,
        post_id: Option<&str>,
        post_types: &[String],
    ) -> Result<CacheManifest> {
        let page = Url::parse(page_url).or_raise(|| ErrorKind::InvalidUrl(page_url.to_string()))?;
        let manifest_path = manifest_path(&page)?;

        let mut lookup = BTreeMap::new();
        for (sheet_url, css) in report.iter() {
            let file_name = self.store_entry(sheet_url, css).await?;
            let key = page.join(sheet_url).map(String::from).unwrap_or_else(|_| sheet_url.to_string());
            lookup.insert(key, file_name);
        }

        let manifest = CacheManifest {
            lookup,
            source_url: page_url.to_string(),
            post_id: post_id.map(str::to_string),
            post_types: post_types.to_vec(),
        };
        self.backend.write(&manifest_path, &manifest.to_vec()?).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(manifest = %manifest_path.display(), entries = manifest.lookup.len(), "wrote page manifest");

        if let Some(post_id) = post_id
            && let Err(e) = self.invalidator.invalidate(post_id).await
        {
            tracing::warn!(post_id, error = ?e, "could not invalidate page cache");
        }
        Ok(manifest)
    }

    async fn store_entry(&self, sheet_url: &str, css: &str) -> Result<String> {
        let mut css = self.minifier.minify(css);
        match Url::parse(sheet_url) {
            Ok(base) => css = absolutize(&css, &base),
            Err(e) => tracing::warn!(sheet_url, error = %e, "stylesheet URL is not absolute, references left as they are"),
        }
        let file_name = content_file_name(&css);
        let created = self.backend.create_new(Path::new(&file_name), css.as_bytes()).await.or_raise(|| ErrorKind::Storage)?;
        match created {
            true => tracing::debug!(sheet_url, %file_name, size = css.len(), "stored new entry"),
            false => tracing::trace!(sheet_url, %file_name, "entry already stored"),
        }
        Ok(file_name)
    }

    /// Manifest for the page at `url`, if the page has been processed.
    pub async fn load_manifest(&self, url: &Url) -> Result<Option<CacheManifest>> {
        let path = manifest_path(url)?;
        if !self.backend.exists(&path).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(None);
        }
        let bytes = self.backend.read(&path).await.or_raise(|| ErrorKind::Storage)?;
        CacheManifest::from_slice(&bytes).map(Some)
    }

    pub async fn cache_summary(&self) -> Result<CacheSummary> {
        let files = self.backend.list(None).await.or_raise(|| ErrorKind::Storage)?;
        let mut summary = CacheSummary::default();
        for file in &files {
            match file.file_name() {
                Some(MANIFEST_FILE) => summary.num_lookup_files += 1,
                Some(name) if file.is_top_level() && name.ends_with(".css") => summary.num_css_files += 1,
                _ => {},
            }
        }
        Ok(summary)
    }

    /// Delete every entry and manifest, then empty each integration purge
    /// directory that exists.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await.or_raise(|| ErrorKind::Storage)?;
        for dir in &self.purge_dirs {
            if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
                tracing::debug!(dir = %dir.display(), "purge directory does not exist");
                continue;
            }
            let dir = std::path::absolute(dir).or_raise(|| ErrorKind::Storage)?;
            let backend = LocalBackend::new("purge", &dir).or_raise(|| ErrorKind::Storage)?;
            backend.clear().await.or_raise(|| ErrorKind::Storage)?;
        }
        tracing::info!(purged = self.purge_dirs.len(), "cleared cache");
        Ok(())
    }
}
