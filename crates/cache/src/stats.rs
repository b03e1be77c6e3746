//! Which plugins' stylesheets turn out to be unused, and where.
//!
//! Every manifest in the cache is read once into a [`PageUsage`], then folded
//! into three views: per page, per plugin and per post type. Stylesheets that
//! cannot be attributed to a plugin are left out of all three.

use crate::consts::EXCLUDED_POST_TYPE_REGEX;
use crate::error::{ErrorKind, Result};
use crate::layout::{MANIFEST_FILE, is_empty_entry, page_key};
use crate::manifest::CacheManifest;
use crate::store::CacheStore;
use exn::ResultExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;
use url::Url;

const SLUG_PLACEHOLDER: &str = "{slug}";

/// Usage of one group (a page, a plugin or a post type).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsEntry {
    pub sortkey: String,
    pub empty_css_count: usize,
    pub found_css_count: usize,
    pub empty_urls: BTreeMap<String, usize>,
    pub found_urls: BTreeMap<String, usize>,
}

impl StatsEntry {
    fn new(sortkey: impl Into<String>) -> Self {
        Self { sortkey: sortkey.into(), ..Self::default() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PluginStats {
    pub by_path: BTreeMap<String, StatsEntry>,
    pub by_plugin: BTreeMap<String, StatsEntry>,
    pub by_post_type: BTreeMap<String, StatsEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsData {
    pub plugin_stats: PluginStats,
}

/// One page key's worth of manifests, counted per plugin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageUsage {
    pub post_types: Vec<String>,
    pub post_id: Option<String>,
    /// Plugin to number of its stylesheets with rules in use.
    pub used: BTreeMap<String, usize>,
    /// Plugin to number of its stylesheets with nothing in use.
    pub empty: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Default)]
pub struct StatsAggregator {
    plugins_dir: Option<PathBuf>,
}

impl StatsAggregator {
    /// With `plugins_dir`, every plugin installed there is listed even if
    /// none of its stylesheets were ever seen.
    pub fn new(plugins_dir: Option<PathBuf>) -> Self {
        Self { plugins_dir }
    }

    #[instrument(skip_all)]
    pub async fn collect(&self, store: &CacheStore) -> Result<StatsData> {
        let pages = self.pages(store).await?;
        let plugins = match &self.plugins_dir {
            Some(dir) => installed_plugins(dir).await?,
            None => Vec::new(),
        };
        tracing::debug!(pages = pages.len(), plugins = plugins.len(), "aggregated manifests");
        Ok(StatsData { plugin_stats: aggregate(&pages, &plugins) })
    }

    /// Read every manifest, keyed by page. Unreadable manifests are skipped.
    pub async fn pages(&self, store: &CacheStore) -> Result<BTreeMap<String, PageUsage>> {
        let backend = store.backend();
        let files = backend.list(None).await.or_raise(|| ErrorKind::Storage)?;
        let mut pages: BTreeMap<String, PageUsage> = BTreeMap::new();
        for file in files.iter().filter(|file| file.file_name() == Some(MANIFEST_FILE)) {
            let manifest = match backend.read(&file.path).await {
                Ok(bytes) => CacheManifest::from_slice(&bytes),
                Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
            };
            match manifest {
                Ok(manifest) => record(&mut pages, file.parent(), &manifest),
                Err(e) => tracing::warn!(path = %file.path.display(), error = ?e, "skipping unreadable manifest"),
            }
        }
        Ok(pages)
    }
}

/// Fold one manifest into `pages`. Pages that collapse onto the same key
/// have their counts summed.
fn record(pages: &mut BTreeMap<String, PageUsage>, dir: &Path, manifest: &CacheManifest) {
    let post_types = filter_post_types(&manifest.post_types);
    let mut key = page_key(dir);
    if post_types.iter().any(|t| t == "single") {
        key = collapse_slug(&key);
    }
    let page = pages.entry(key).or_default();
    for post_type in post_types {
        if !page.post_types.contains(&post_type) {
            page.post_types.push(post_type);
        }
    }
    if page.post_id.is_none() {
        page.post_id = manifest.post_id.clone();
    }
    for (url, file_name) in &manifest.lookup {
        let Some(plugin) = plugin_from_url(url) else {
            continue;
        };
        let counts = match is_empty_entry(file_name) {
            true => &mut page.empty,
            false => &mut page.used,
        };
        *counts.entry(plugin).or_default() += 1;
    }
}

/// Build the three views.
pub fn aggregate(pages: &BTreeMap<String, PageUsage>, installed_plugins: &[String]) -> PluginStats {
    let mut stats = PluginStats::default();
    for (path, page) in pages {
        stats.by_path.insert(
            path.clone(),
            StatsEntry {
                sortkey: path.clone(),
                empty_css_count: page.empty.len(),
                found_css_count: page.used.len(),
                empty_urls: page.empty.clone(),
                found_urls: page.used.clone(),
            },
        );

        for (plugin, count) in &page.used {
            let entry = stats.by_plugin.entry(plugin.clone()).or_insert_with(|| StatsEntry::new(plugin));
            entry.found_css_count += 1;
            entry.found_urls.insert(path.clone(), *count);
        }
        for (plugin, count) in &page.empty {
            let entry = stats.by_plugin.entry(plugin.clone()).or_insert_with(|| StatsEntry::new(plugin));
            entry.empty_css_count += 1;
            entry.empty_urls.insert(path.clone(), *count);
        }

        for post_type in &page.post_types {
            let entry = stats.by_post_type.entry(post_type.clone()).or_insert_with(|| StatsEntry::new(post_type));
            for (plugin, count) in &page.used {
                entry.found_urls.entry(plugin.clone()).or_insert(*count);
            }
            for (plugin, count) in &page.empty {
                entry.empty_urls.entry(plugin.clone()).or_insert(*count);
            }
            entry.found_css_count = entry.found_urls.len();
            entry.empty_css_count = entry.empty_urls.len();
        }
    }
    for plugin in installed_plugins {
        stats.by_plugin.entry(plugin.clone()).or_insert_with(|| StatsEntry::new(plugin));
    }
    stats
}

/// Post types worth grouping by: drops anything mentioning `home` and the
/// template, id, child and parent variants.
pub fn filter_post_types(types: &[String]) -> Vec<String> {
    types.iter().filter(|t| !EXCLUDED_POST_TYPE_REGEX.is_match(t)).cloned().collect()
}

/// Plugin directory name from a stylesheet URL: the path segment following
/// `plugins`.
pub fn plugin_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "plugins")?;
    segments.next().filter(|plugin| !plugin.is_empty()).map(str::to_string)
}

/// Replace the last segment of a page key with `{slug}`.
fn collapse_slug(key: &str) -> String {
    match key.rsplit_once('/') {
        _ if key == "/" => key.to_string(),
        Some((parent, _)) => format!("{parent}/{SLUG_PLACEHOLDER}"),
        None => SLUG_PLACEHOLDER.to_string(),
    }
}

/// Directory names in `dir`, skipping hidden and `_`-prefixed entries. A
/// missing directory has no plugins.
async fn installed_plugins(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
    };
    let mut plugins = Vec::new();
    while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Storage)? {
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dir && !name.starts_with('.') && !name.starts_with('_') {
            plugins.push(name);
        }
    }
    plugins.sort();
    Ok(plugins)
}
