//! Liveness endpoints
//!
//! `/` answers with the legacy banner message, `/health` with a JSON status
//! object carrying build metadata. Neither touches storage.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::{json_response, AppState};

/// Health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// Operating mode
    pub mode: &'static str,
    /// Blob storage backend ("gridfs" or "memory")
    pub storage: &'static str,
    pub timestamp: String,
}

/// Root banner
pub fn root() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "message": "EmoGo Backend is running" }),
    )
}

/// Liveness probe - returns 200 while the process is serving
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
        uptime: state.started_at.elapsed().as_secs(),
        mode: state.mode(),
        storage: state.blobs.backend(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-store")
        .body(Full::new(Bytes::from(
            serde_json::to_string(&response).unwrap_or_default(),
        )))
        .unwrap()
}
