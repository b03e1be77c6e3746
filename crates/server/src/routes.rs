//! REST endpoints under `/wp-json/unused-css/`.
//!
//! `update_css` is public: it is what the detector posts to. Everything else
//! requires a privileged viewer.

use crate::auth::ViewerAuth;
use crate::error::ErrorKind;
use crate::ingest::ingest;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use ucss_cache::{CacheStore, StatsAggregator};
use ucss_detect::{UpdateCssRequest, UpdateCssResponse};

pub const API_PREFIX: &str = "/wp-json/unused-css";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: CacheStore,
    pub stats: StatsAggregator,
    pub auth: Arc<dyn ViewerAuth>,
}

enum ApiError {
    BadRequest(String),
    Forbidden,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/update_css", post(update_css))
        .route("/get_css_data", get(get_css_data).post(get_css_data))
        .route("/get_dashboard_data", get(get_dashboard_data).post(get_dashboard_data))
        .route("/clear_css_cache", get(clear_css_cache));
    Router::new().nest(API_PREFIX, api).with_state(state)
}

fn require_privileged(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    match state.auth.is_privileged(headers) {
        true => Ok(()),
        false => Err(ApiError::Forbidden),
    }
}

/// POST update_css: `{"compressedData": "..."}` from the detector.
async fn update_css(State(state): State<AppState>, body: Bytes) -> Result<Json<UpdateCssResponse>, ApiError> {
    let request: UpdateCssRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    match ingest(&state.store, &request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => match &*e {
            ErrorKind::InvalidPayload(message) => {
                tracing::warn!(error = ?e, "rejected usage report");
                Err(ApiError::BadRequest(message.clone()))
            },
            _ => {
                tracing::error!(error = ?e, "could not store usage report");
                Err(ApiError::Internal)
            },
        },
    }
}

/// GET|POST get_css_data: cache counts plus usage statistics.
async fn get_css_data(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    require_privileged(&state, &headers)?;
    let cache_data = state.store.cache_summary().await.map_err(internal)?;
    let stats_data = state.stats.collect(&state.store).await.map_err(internal)?;
    Ok(Json(json!({ "cache_data": cache_data, "stats_data": stats_data })))
}

/// GET|POST get_dashboard_data: cache counts only.
async fn get_dashboard_data(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    require_privileged(&state, &headers)?;
    let cache_data = state.store.cache_summary().await.map_err(internal)?;
    Ok(Json(json!({ "cache_data": cache_data })))
}

/// GET clear_css_cache: empties the cache and answers with an empty array.
async fn clear_css_cache(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    require_privileged(&state, &headers)?;
    state.store.clear().await.map_err(internal)?;
    Ok(Json(json!([])))
}

fn internal(e: ucss_cache::error::Error) -> ApiError {
    tracing::error!(error = ?e, "cache request failed");
    ApiError::Internal
}
