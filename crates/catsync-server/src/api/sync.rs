use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use catsync_core::{LookupTargets, ProductStore};
use catsync_sync::{SyncError, SyncRequest, SyncSource};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{ApiError, AppState};

/// A key as it arrives on the wire: some clients send barcodes and numeric
/// ids as numbers, others as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum WireKey {
    Number(i64),
    Text(String),
}

impl WireKey {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }

    fn to_id(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct SyncPayload {
    pub barcodes: Vec<WireKey>,
    #[serde(alias = "wbSkus")]
    pub nm_ids: Vec<WireKey>,
    #[serde(alias = "codes")]
    pub vendor_codes: Vec<WireKey>,
    pub debug: bool,
    pub max_pages: Option<usize>,
    pub dry_run: bool,
}

/// Request body: either a payload object or a bare array of barcodes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum SyncBody {
    Barcodes(Vec<WireKey>),
    Payload(SyncPayload),
}

impl SyncBody {
    /// Parses a raw body. An empty body is an empty payload.
    pub(super) fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::Payload(SyncPayload::default()));
        }
        serde_json::from_slice(raw)
    }

    pub(super) fn into_request(self, source: SyncSource) -> SyncRequest {
        let payload = match self {
            Self::Barcodes(barcodes) => SyncPayload {
                barcodes,
                ..SyncPayload::default()
            },
            Self::Payload(payload) => payload,
        };

        let numeric_ids: Vec<i64> = payload.nm_ids.iter().filter_map(WireKey::to_id).collect();
        SyncRequest {
            source,
            targets: LookupTargets::new(
                payload.barcodes.into_iter().map(WireKey::into_text),
                payload.vendor_codes.into_iter().map(WireKey::into_text),
                numeric_ids,
            ),
            max_pages: payload.max_pages,
            debug: payload.debug,
            dry_run: payload.dry_run,
        }
    }
}

pub(super) async fn sync_catalog<S>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Response
where
    S: ProductStore + 'static,
{
    run_pass(state, req_id, &body, SyncSource::Catalog).await
}

pub(super) async fn sync_supplies<S>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Response
where
    S: ProductStore + 'static,
{
    run_pass(state, req_id, &body, SyncSource::Supplies).await
}

pub(super) async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn run_pass<S>(
    state: AppState<S>,
    req_id: RequestId,
    body: &[u8],
    source: SyncSource,
) -> Response
where
    S: ProductStore + 'static,
{
    let request = match SyncBody::parse(body) {
        Ok(parsed) => parsed.into_request(source),
        Err(e) => {
            return ApiError::new(
                StatusCode::BAD_REQUEST,
                req_id.0,
                format!("invalid request body: {e}"),
            )
            .into_response();
        }
    };

    let _guard = state.pass_lock.lock().await;
    match state.engine.run(&request).await {
        Ok(outcome) => {
            if let Some(write_error) = &outcome.write_error {
                let mut error = ApiError::internal(req_id.0, write_error.clone());
                error.applied = Some(outcome.applied);
                error.staged = Some(outcome.patched);
                return error.into_response();
            }
            Json(outcome).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "sync pass failed");
            let mut error = ApiError::internal(req_id.0, e.to_string());
            if let SyncError::Marketplace { staged, .. } = &e {
                error.staged = Some(staged.len());
            }
            error.into_response()
        }
    }
}
