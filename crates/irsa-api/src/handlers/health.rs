//! Liveness and readiness.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sts_endpoint: String,
    pub providers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,
}

/// Report what the proxy is forwarding to and how many issuers it trusts.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        sts_endpoint: state.sts_endpoint().to_string(),
        providers: state.rewriter.provider_count(),
        signing_key_id: state.rewriter.signing_key_id().map(str::to_string),
    })
}

/// Ready once at least one issuer is registered; with none every request passes through.
pub async fn ready(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.rewriter.provider_count() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
