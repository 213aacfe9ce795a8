mod sync;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use catsync_core::ProductStore;
use catsync_sync::SyncEngine;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{request_id, REQUEST_ID_HEADER};

/// Shared handler state.
///
/// Passes are serialized through `pass_lock`: two passes may stage patches
/// for the same record, so they never run concurrently.
pub struct AppState<S> {
    pub engine: Arc<SyncEngine<S>>,
    pub pass_lock: Arc<Mutex<()>>,
}

impl<S> AppState<S> {
    pub fn new(engine: SyncEngine<S>) -> Self {
        Self {
            engine: Arc::new(engine),
            pass_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            pass_lock: Arc::clone(&self.pass_lock),
        }
    }
}

/// Error envelope: `{"error": "...", "requestId": "..."}` plus the partial
/// counters of a pass that failed halfway.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<usize>,
}

impl ApiError {
    pub fn new(status: StatusCode, request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            request_id: request_id.into(),
            applied: None,
            staged: None,
        }
    }

    pub fn internal(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, request_id, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub fn build_app<S>(state: AppState<S>) -> Router
where
    S: ProductStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/sync",
            post(sync::sync_catalog::<S>).options(sync::preflight),
        )
        .route(
            "/api/v1/sync/supplies",
            post(sync::sync_supplies::<S>).options(sync::preflight),
        )
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}
