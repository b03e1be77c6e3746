//! Configuration for the unused-CSS pipeline.
//!
//! Values are layered with [`figment`]: built-in defaults, then an optional
//! file (TOML, YAML or JSON, picked by extension), then `UCSS_`-prefixed
//! environment variables where `__` separates nesting levels
//! (`UCSS_CACHE__DIRECTORY=...`).
//!
//! The configuration is read-only at runtime: components receive a
//! constructed [`Config`] at startup instead of consulting global state.

pub mod error;
mod mode;
mod patterns;

pub use crate::mode::Mode;
pub use crate::patterns::{DEFAULT_INCLUDE_PATTERNS, IncludePatterns};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;
use url::Url;

const ENV_PREFIX: &str = "UCSS_";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public URL of the site. Its host keys the cache directory.
    pub site_url: Url,
    pub mode: Mode,
    pub include_patterns: IncludePatterns,
    pub cache: CacheConfig,
    pub detector: DetectorConfig,
    pub server: ServerConfig,
    pub stats: StatsConfig,
    pub integrations: IntegrationsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding every cache (`wp-content/cache` on a WordPress
    /// install). Relative paths are resolved against the working directory.
    pub root: PathBuf,
    /// Name of this pipeline's directory inside `root`. Stylesheets whose
    /// path contains it are never analysed.
    pub directory: String,
    /// URL path under which `root` is publicly served.
    pub public_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub log_warnings: bool,
    /// Quiet time after the last scroll before collecting.
    pub quiet_period_ms: u64,
    /// Collect after this long if the visitor never scrolls.
    pub fallback_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Bearer token identifying privileged viewers. With no token configured
    /// nobody is privileged.
    pub admin_token: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Plugins directory; every plugin found there is listed in the stats
    /// even when none of its stylesheets were seen.
    pub plugins_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Page-cache directories of other plugins, emptied whenever the CSS
    /// cache is cleared so they stop serving pages that link to it.
    pub purge_dirs: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: Url::parse("http://localhost/").expect("static URL is valid"),
            mode: Mode::default(),
            include_patterns: IncludePatterns::default(),
            cache: CacheConfig::default(),
            detector: DetectorConfig::default(),
            server: ServerConfig::default(),
            stats: StatsConfig::default(),
            integrations: IntegrationsConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("wp-content/cache"),
            directory: "acd-unused-css".to_string(),
            public_path: "/wp-content/cache".to_string(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { log_warnings: false, quiet_period_ms: 1_000, fallback_ms: 5_000 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: SocketAddr::from(([127, 0, 0, 1], 8080)), admin_token: None }
    }
}

impl DetectorConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn fallback(&self) -> Duration {
        Duration::from_millis(self.fallback_ms)
    }
}

impl Config {
    /// Load configuration from defaults, `file` (or the per-user default
    /// location when `None`) and the environment.
    #[instrument]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = file.map(Path::to_path_buf).or_else(Self::default_file);
        Self::from_figment(Self::figment(file.as_deref()))
    }

    /// Per-user configuration file, used when no file is given explicitly.
    pub fn default_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ucss").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The layered provider stack, exposed so callers can merge their own
    /// overrides (command-line flags) on top.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            tracing::debug!(file = %file.display(), "reading configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Invalid("failed to extract".to_string()))?;
        config.hostname()?;
        Ok(config)
    }

    /// Host of [`site_url`](Self::site_url).
    pub fn hostname(&self) -> Result<&str> {
        self.site_url.host_str().ok_or_raise(|| ErrorKind::MissingHost(self.site_url.to_string()))
    }

    /// Directory holding the content-addressed files and manifests for this
    /// site: `<cache.root>/<cache.directory>/<hostname>`.
    pub fn cache_path(&self) -> Result<PathBuf> {
        Ok(self.cache.root.join(&self.cache.directory).join(self.hostname()?))
    }

    /// Public URL of [`cache_path`](Self::cache_path), without a trailing
    /// slash.
    pub fn cache_url(&self) -> Result<String> {
        let site = self.site_url.as_str().trim_end_matches('/');
        let public = self.cache.public_path.trim_matches('/');
        let base = match public.is_empty() {
            true => site.to_string(),
            false => format!("{site}/{public}"),
        };
        Ok(format!("{base}/{}/{}", self.cache.directory, self.hostname()?))
    }
}
