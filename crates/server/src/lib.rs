//! REST endpoints and command-line entry points for the unused-CSS pipeline.

pub mod auth;
pub mod cli;
pub mod error;
mod ingest;
mod loader;
mod routes;

pub use crate::auth::{TokenAuthorizer, ViewerAuth};
pub use crate::ingest::{DirectTransmitter, ingest};
pub use crate::loader::WebrootLoader;
pub use crate::routes::{API_PREFIX, AppState, build_router};
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,ucss_cache=debug";

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
