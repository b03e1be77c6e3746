use crate::error::Result;
use async_trait::async_trait;

/// Tells downstream page caches that a post's markup is stale, so the next
/// render picks up the new manifest.
#[async_trait]
pub trait Invalidator: Send + Sync {
    async fn invalidate(&self, post_id: &str) -> Result<()>;
}

/// For deployments without a page cache in front.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl Invalidator for NoopInvalidator {
    async fn invalidate(&self, post_id: &str) -> Result<()> {
        tracing::trace!(post_id, "no page cache to invalidate");
        Ok(())
    }
}
