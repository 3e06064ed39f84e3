//! API error handling

use axum::{
    extract::multipart::MultipartError,
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::attestation::AttestationError;
use crate::gateway::GatewayError;
use crate::sponsorship::SponsorshipError;
use crate::storage::StorageError;
use crate::wallet::WalletError;

/// Error returned by every handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unix seconds
    pub timestamp: u64,
}

impl ApiError {
    pub fn new(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn with_details(code: u16, message: String, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    // Common error constructors
    pub fn bad_request(message: &str) -> Self {
        Self::new(400, message.to_string())
    }

    pub fn forbidden(message: &str) -> Self {
        Self::new(403, message.to_string())
    }

    pub fn internal_server_error(message: &str) -> Self {
        Self::new(500, message.to_string())
    }

    /// Failure of a downstream service, relayed to the caller
    pub fn upstream(context: &str, reason: impl fmt::Display) -> Self {
        Self::with_details(
            500,
            format!("{}: {}", context, reason),
            serde_json::json!({ "reason": reason.to_string() }),
        )
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    #[serde(flatten)]
    pub error: ApiError,
}

impl ErrorResponse {
    pub fn new(error: ApiError) -> Self {
        Self {
            success: false,
            error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.code >= 500 {
            log::error!("{}", self);
        } else {
            log::debug!("{}", self);
        }
        (self.status(), Json(ErrorResponse::new(self))).into_response()
    }
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub value: Option<serde_json::Value>,
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::with_details(
            400,
            err.message.clone(),
            serde_json::to_value(&err).unwrap_or(serde_json::Value::Null),
        )
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidTag(reason) => {
                Self::bad_request(&format!("Bad Request: {}", reason))
            }
            other => Self::upstream("Storage gateway error", other),
        }
    }
}

impl From<AttestationError> for ApiError {
    fn from(err: AttestationError) -> Self {
        match err {
            AttestationError::MissingSchema => {
                Self::internal_server_error("EAS Schema UID is not configured on the server.")
            }
            other => Self::upstream("Attestation failed", other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::upstream("Approval store error", err)
    }
}

impl From<SponsorshipError> for ApiError {
    fn from(err: SponsorshipError) -> Self {
        match err {
            SponsorshipError::Gateway(e) => e.into(),
            SponsorshipError::Storage(e) => e.into(),
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InvalidAmount { .. } => Self::bad_request(&err.to_string()),
            WalletError::InvalidSignature(reason) => {
                Self::bad_request(&format!("Invalid signature: {}", reason))
            }
            other => Self::internal_server_error(&other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status().as_u16(), format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Malformed request bodies and query strings are client errors; only an
/// oversized body keeps its own status
fn rejection(status: StatusCode, kind: &str, text: String) -> ApiError {
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        status.as_u16()
    } else {
        400
    };
    ApiError::with_details(
        code,
        format!("Bad Request: {}", text),
        serde_json::json!({ "rejection": kind }),
    )
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        rejection(err.status(), "json", err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        rejection(err.status(), "query", err.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        rejection(err.status(), "multipart", err.body_text())
    }
}

/// Convert anyhow::Error to ApiError
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_server_error(&err.to_string())
    }
}
