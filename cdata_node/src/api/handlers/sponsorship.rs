use axum::{extract::State, response::Json};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::validation::validate_address;
use crate::api::{ApiError, ApiJson, ApiQuery, ApiResult, AppState};
use crate::gateway::Approval;
use crate::sponsorship::{SponsorshipError, UserIdentity};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateSponsoredUploadRequest {
    pub user_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateSponsoredUploadResponse {
    pub success: bool,
    /// Gateway id of the approval
    pub approval_tx_id: String,
    pub approved_amount_atomic: String,
    pub sponsor_evm_address: String,
    pub sponsor_irys_address: String,
    /// Milliseconds since epoch
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploaderApprovalsQuery {
    pub uploader_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoApproveRequest {
    pub user_address: Option<String>,
    pub social_provider: Option<String>,
    /// Identity-provider user id
    pub user_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoApproveResponse {
    pub success: bool,
    pub approved: bool,
    pub delegation_id: String,
    pub expires_at: i64,
    pub message: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Let `userAddress` spend from the server's storage balance
pub async fn initiate_sponsored_upload(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<InitiateSponsoredUploadRequest>,
) -> ApiResult<Json<InitiateSponsoredUploadResponse>> {
    let user_address = req.user_address.unwrap_or_default();
    validate_address("userAddress", &user_address)?;
    let user_address = user_address.trim();

    info!("Initiating sponsored upload for {}", user_address);
    let sponsored = state.sponsorship.initiate(user_address).await?;

    Ok(Json(InitiateSponsoredUploadResponse {
        success: true,
        approval_tx_id: sponsored.approval_tx_id,
        approved_amount_atomic: sponsored.approved_amount_atomic.to_string(),
        sponsor_evm_address: sponsored.sponsor_evm_address,
        sponsor_irys_address: sponsored.sponsor_irys_address,
        expires_at: sponsored.expires_at,
    }))
}

/// Approvals paid by the server account
pub async fn sponsor_approvals(State(state): State<AppState>) -> ApiResult<Json<Vec<Approval>>> {
    Ok(Json(state.gateway.created_approvals().await?))
}

/// Approvals granted to one uploader
pub async fn uploader_approvals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UploaderApprovalsQuery>,
) -> ApiResult<Json<Vec<Approval>>> {
    let uploader = query.uploader_address.unwrap_or_default();
    validate_address("uploaderAddress", &uploader)?;
    Ok(Json(state.gateway.received_approvals(uploader.trim()).await?))
}

/// Error carrying the `approved: false` outcome alongside the cause
fn auto_approve_failure(err: SponsorshipError) -> ApiError {
    let reason = err.to_string();
    let mut api_error: ApiError = err.into();
    api_error.details = Some(json!({
        "approved": false,
        "message": "Auto-approval process failed.",
        "reason": reason,
    }));
    api_error
}

/// Approve a signed-in user once, reusing a still-valid approval
pub async fn auto_approve(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AutoApproveRequest>,
) -> ApiResult<Json<AutoApproveResponse>> {
    let user_address = req.user_address.unwrap_or_default();
    if validate_address("userAddress", &user_address).is_err() {
        return Err(ApiError::bad_request(
            "Auto-approval failed: User address is missing or invalid.",
        ));
    }

    let identity = UserIdentity {
        provider_user_id: non_empty(req.user_id),
        email: non_empty(req.email),
        social_provider: non_empty(req.social_provider),
    };
    let approval = state
        .sponsorship
        .auto_approve(user_address.trim(), identity)
        .await
        .map_err(auto_approve_failure)?;

    let message = if approval.already_active {
        "User already approved and delegation is active."
    } else {
        "User auto-approved successfully for Irys uploads."
    };
    Ok(Json(AutoApproveResponse {
        success: true,
        approved: true,
        delegation_id: approval.record.delegation_id,
        expires_at: approval.record.expires_at,
        message: message.to_string(),
    }))
}
