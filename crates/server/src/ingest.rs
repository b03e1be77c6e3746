use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use tracing::instrument;
use ucss_cache::CacheStore;
use ucss_cache::error::ErrorKind as CacheErrorKind;
use ucss_detect::error::{ErrorKind as DetectErrorKind, Result as DetectResult};
use ucss_detect::{Transmitter, TransmissionEnvelope, UpdateCssRequest, UpdateCssResponse};

/// Open a sealed usage report and file it in the cache.
#[instrument(skip_all, fields(sealed_size = request.compressed_data.len()))]
pub async fn ingest(store: &CacheStore, request: &UpdateCssRequest) -> Result<UpdateCssResponse> {
    let envelope = match TransmissionEnvelope::open(&request.compressed_data) {
        Ok(envelope) => envelope,
        Err(e) => {
            let message = (*e).to_string();
            return Err(e).or_raise(|| ErrorKind::InvalidPayload(message));
        },
    };
    if let Err(e) = store.accept(&envelope).await {
        // The page URL comes from the client, so a bad one is the client's fault.
        let invalid_url = match &*e {
            CacheErrorKind::InvalidUrl(url) => Some(format!("invalid page url: {url}")),
            _ => None,
        };
        return match invalid_url {
            Some(message) => Err(e).or_raise(|| ErrorKind::InvalidPayload(message)),
            None => Err(e).or_raise(|| ErrorKind::Cache),
        };
    }
    tracing::info!(url = %envelope.url, sheets = envelope.css.len(), reduction = envelope.reduction, "accepted usage report");
    Ok(UpdateCssResponse::new(envelope.reduction))
}

/// Hands reports straight to a local cache, for offline runs where detector
/// and cache share a process.
#[derive(Clone)]
pub struct DirectTransmitter {
    store: CacheStore,
}

impl DirectTransmitter {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Transmitter for DirectTransmitter {
    async fn transmit(&self, request: UpdateCssRequest) -> DetectResult<UpdateCssResponse> {
        ingest(&self.store, &request)
            .await
            .or_raise(|| DetectErrorKind::Transmission("cache refused the report".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use ucss_detect::send_report;
    use ucss_storage::backend::MockBackend;
    use url::Url;

    fn envelope() -> TransmissionEnvelope {
        TransmissionEnvelope {
            css: [("https://example.com/wp-content/plugins/forms/forms.css", "")].into_iter().collect(),
            url: "https://example.com/contact/".to_string(),
            post_id: Some("5".to_string()),
            post_types: vec!["page".to_string()],
            reduction: 87.456,
        }
    }

    #[tokio::test]
    async fn test_ingest() {
        let store = CacheStore::new(Arc::new(MockBackend::default()));
        let request = UpdateCssRequest { compressed_data: envelope().seal().unwrap() };
        let response = ingest(&store, &request).await.unwrap();
        assert_eq!(response.reduction, "87.46");
        let manifest = store.load_manifest(&Url::parse("https://example.com/contact/").unwrap()).await.unwrap().unwrap();
        assert_eq!(manifest.post_id.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_ingest_rejects_garbage() {
        let store = CacheStore::new(Arc::new(MockBackend::default()));
        let request = UpdateCssRequest { compressed_data: "%%% not base64".to_string() };
        let err = ingest(&store, &request).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPayload(_)));
    }

    #[rstest]
    #[case("not a url")]
    #[case("/contact/")]
    #[tokio::test]
    async fn test_ingest_rejects_bad_page_urls(#[case] url: &str) {
        let store = CacheStore::new(Arc::new(MockBackend::default()));
        let envelope = TransmissionEnvelope { url: url.to_string(), ..envelope() };
        let request = UpdateCssRequest { compressed_data: envelope.seal().unwrap() };
        let err = ingest(&store, &request).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPayload(message) if message.contains(url)));
        assert!(store.backend().list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_transmitter() {
        let store = CacheStore::new(Arc::new(MockBackend::default()));
        send_report(&envelope(), &DirectTransmitter::new(store.clone())).await;
        assert_eq!(store.cache_summary().await.unwrap().num_lookup_files, 1);
    }
}
