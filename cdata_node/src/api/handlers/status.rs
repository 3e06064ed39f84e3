use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::api::AppState;

/// Response for `/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// RFC 3339 server time
    pub timestamp: String,
}

/// Response for `/api/health`
#[derive(Debug, Serialize)]
pub struct ApiHealthResponse {
    pub status: &'static str,
    pub message: String,
}

/// Server wallet published to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// EIP-55 checksummed address
    pub public_key: String,
    #[serde(rename = "type")]
    pub key_type: &'static str,
}

pub async fn banner() -> &'static str {
    "C-Data POC Backend is running!"
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

pub async fn api_health(State(state): State<AppState>) -> Json<ApiHealthResponse> {
    Json(ApiHealthResponse {
        status: "UP",
        message: format!(
            "C-Data backend is healthy ({} network, {})",
            state.settings.network.as_str(),
            state.gateway.token()
        ),
    })
}

pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.wallet.checksum_address(),
        key_type: "EVM",
    })
}
