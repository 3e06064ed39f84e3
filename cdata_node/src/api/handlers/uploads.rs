use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::api::validation::{require_field, validate_address};
use crate::api::{ApiError, ApiJson, ApiResult, AppState};
use crate::gateway::{validate_tags, Tag};
use crate::wallet::{from_atomic, recover_personal_signer};

pub const APP_NAME: &str = "C-Data-POC";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDataRequest {
    pub user_id: Option<String>,
    pub data_to_sign: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDataResponse {
    pub message: String,
    pub arweave_tx_id: String,
    pub timestamp: Option<u64>,
}

/// Response for a stored photo
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPhotoResponse {
    pub success: bool,
    pub message: String,
    /// Data item id, resolvable on Arweave gateways once settled
    pub arweave_tx_id: String,
    pub original_name: String,
    pub mime_type: String,
    /// Bytes
    pub size: usize,
    /// Hex SHA-256 of the file
    pub content_hash: String,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

#[derive(Debug)]
struct PhotoFile {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct PhotoForm {
    metadata_to_sign: Option<String>,
    signature: Option<String>,
    user_eoa: Option<String>,
    photo: Option<PhotoFile>,
}

async fn read_photo_form(mut multipart: Multipart) -> ApiResult<PhotoForm> {
    let mut form = PhotoForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photoFile" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                form.photo = Some(PhotoFile {
                    name: file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            "metadataToSign" => form.metadata_to_sign = Some(field.text().await?),
            "signature" => form.signature = Some(field.text().await?),
            "userEOA" => form.user_eoa = Some(field.text().await?),
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }
    Ok(form)
}

/// Upload an arbitrary JSON document on behalf of an allowed user
pub async fn sign_data(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignDataRequest>,
) -> ApiResult<Json<SignDataResponse>> {
    let user_id = req.user_id.as_deref().unwrap_or_default();
    let allowed = !user_id.is_empty()
        && (state.settings.uploads.allowed_users.iter().any(|u| u == user_id)
            || validate_address("userId", user_id).is_ok());
    if !allowed {
        return Err(ApiError::forbidden("Forbidden: User not authorized"));
    }

    let data = match req.data_to_sign {
        Some(data) if !data.is_null() => data,
        _ => return Err(ApiError::bad_request("Bad Request: dataToSign is required")),
    };
    info!("User '{}' authorized, uploading JSON document", user_id);

    let bytes = serde_json::to_vec(&data)
        .map_err(|e| ApiError::internal_server_error(&format!("Failed to encode data: {}", e)))?;
    let receipt = state
        .gateway
        .upload(bytes, vec![Tag::new("Content-Type", "application/json")])
        .await?;
    info!("JSON document uploaded: {}", receipt.id);

    Ok(Json(SignDataResponse {
        message: format!(
            "JSON Data uploaded to Arweave via Irys successfully (paid with {})",
            state.gateway.token()
        ),
        arweave_tx_id: receipt.id,
        timestamp: receipt.timestamp,
    }))
}

/// Store a user-signed photo with provenance tags
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadPhotoResponse>> {
    let form = read_photo_form(multipart?).await?;

    let metadata_to_sign = require_field("metadataToSign", form.metadata_to_sign.as_deref())?;
    let signature = require_field("signature", form.signature.as_deref())?;
    let user_eoa = require_field("userEOA", form.user_eoa.as_deref())?.trim();
    let user_address = validate_address("userEOA", user_eoa)?;
    let photo = match form.photo {
        Some(photo) if !photo.bytes.is_empty() => photo,
        _ => return Err(ApiError::bad_request("Bad Request: No photo file provided.")),
    };

    if state.settings.uploads.verify_signatures {
        let signer = recover_personal_signer(metadata_to_sign, signature)?;
        if signer != user_address {
            warn!(
                "Signature for upload recovers {:?}, expected {:?}",
                signer, user_address
            );
            return Err(ApiError::forbidden(
                "Forbidden: signature does not match userEOA",
            ));
        }
    }

    info!(
        "Received photo {} ({} bytes, {}) from {}",
        photo.name,
        photo.bytes.len(),
        photo.mime_type,
        user_eoa
    );
    let content_hash = hex::encode(Sha256::digest(&photo.bytes));
    let tags = vec![
        Tag::new("Content-Type", photo.mime_type.as_str()),
        Tag::new("App-Name", APP_NAME),
        Tag::new("User-EOA", user_eoa),
        Tag::new("Signed-Metadata-JSON", metadata_to_sign),
        Tag::new("EOA-Signature", signature),
        Tag::new("Content-SHA256", content_hash.as_str()),
    ];
    validate_tags(&tags)?;

    // Advisory only; the gateway is the one that refuses unfunded uploads
    match state.gateway.loaded_balance().await {
        Ok(balance) if balance.is_zero() => {
            warn!("Storage balance is zero, upload will likely fail")
        }
        Ok(balance) => debug!(
            "Storage balance: {} atomic ({} {})",
            balance,
            from_atomic(balance, state.settings.gateway.token_decimals).unwrap_or_default(),
            state.gateway.token()
        ),
        Err(e) => error!("Error fetching storage balance: {}", e),
    }

    let size = photo.bytes.len();
    let receipt = state.gateway.upload(photo.bytes, tags).await?;
    info!("Photo uploaded: {}", receipt.id);

    Ok(Json(UploadPhotoResponse {
        success: true,
        message: "Photo uploaded to Arweave via Irys successfully".to_string(),
        arweave_tx_id: receipt.id,
        original_name: photo.name,
        mime_type: photo.mime_type,
        size,
        content_hash,
        timestamp: receipt
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64),
    }))
}
