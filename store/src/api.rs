//! HTTP surface of the attestation store.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use vescrow_core::attestation::{ClaimRequest, Numeric, StatusReport};

use crate::error::StoreError;
use crate::service::AttestationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AttestationStore>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    pub chain_id: Numeric,
    pub agreement_id: Numeric,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error body returned for every non-2xx response.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if e.is_client_error() {
            Self::BadRequest(e.to_string())
        } else {
            error!(error = %e, "Store failure");
            Self::Internal
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks/complete", post(complete))
        .route("/tasks/dispute", post(dispute))
        .route("/tasks/:chain_id/:agreement_id", get(status))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    max_body_bytes: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state, max_body_bytes))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn status(
    State(state): State<AppState>,
    Path((chain_id, agreement_id)): Path<(String, String)>,
) -> Result<Json<StatusReport>, ApiError> {
    let chain_id = parse_id("chainId", chain_id)?;
    let agreement_id = parse_id("agreementId", agreement_id)?;
    let report = state.store.read_status(chain_id, agreement_id).await?;
    Ok(Json(report))
}

async fn complete(
    State(state): State<AppState>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<Json<StatusReport>, ApiError> {
    let Json(claim) = payload?;
    Ok(Json(state.store.record_completion(&claim).await?))
}

async fn dispute(
    State(state): State<AppState>,
    payload: Result<Json<DisputeRequest>, JsonRejection>,
) -> Result<Json<StatusReport>, ApiError> {
    let Json(req) = payload?;
    let chain_id = req.chain_id.parse("chainId").map_err(StoreError::from)?;
    let agreement_id = req
        .agreement_id
        .parse("agreementId")
        .map_err(StoreError::from)?;
    let report = state
        .store
        .mark_disputed(chain_id, agreement_id, req.reason.as_deref())
        .await?;
    Ok(Json(report))
}

fn parse_id(field: &'static str, raw: String) -> Result<u64, ApiError> {
    Numeric::Text(raw)
        .parse(field)
        .map_err(|e| StoreError::from(e).into())
}
