use async_trait::async_trait;
use exn::ResultExt;
use std::path::PathBuf;
use ucss_detect::cssom::StylesheetLoader;
use ucss_detect::error::{ErrorKind, Result};
use ucss_storage::validate_path;
use url::Url;

/// Reads same-site stylesheets from the site's document root instead of
/// fetching them over HTTP.
#[derive(Clone, Debug)]
pub struct WebrootLoader {
    site: Url,
    webroot: PathBuf,
}

impl WebrootLoader {
    pub fn new(site: Url, webroot: impl Into<PathBuf>) -> Self {
        Self { site, webroot: webroot.into() }
    }

    fn local_path(&self, url: &Url) -> Option<PathBuf> {
        if url.host_str() != self.site.host_str() || url.port_or_known_default() != self.site.port_or_known_default() {
            return None;
        }
        validate_path(url.path()).ok().map(|path| self.webroot.join(path))
    }
}

#[async_trait]
impl StylesheetLoader for WebrootLoader {
    async fn load(&self, url: &Url) -> Result<String> {
        let Some(path) = self.local_path(url) else {
            exn::bail!(ErrorKind::Load(format!("{url} is not served from the webroot")));
        };
        tokio::fs::read_to_string(&path).await.or_raise(|| ErrorKind::Load(url.to_string()))
    }
}
