use axum::{extract::State, http::StatusCode, response::Json};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::validation::{validate_address, validate_coordinates};
use crate::api::{ApiError, ApiJson, ApiResult, AppState};
use crate::attestation::{AttestationError, PhotoAttestation};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttestationRequest {
    pub recipient: Option<String>,
    pub photo_taken_date: Option<String>,
    /// Expected to be `[lat, lon]` as strings; validated by hand so that
    /// malformed shapes get a 400
    pub coordinates: Option<Value>,
    pub arweave_tx_id: Option<String>,
    pub thumbnail_hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttestationResponse {
    pub message: String,
    #[serde(rename = "attestationUID")]
    pub attestation_uid: String,
    pub transaction_hash: String,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

impl CreateAttestationRequest {
    /// Check the request without touching the chain
    pub fn validate(self) -> ApiResult<PhotoAttestation> {
        let coordinates_present = match &self.coordinates {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        };
        if !(present(&self.recipient)
            && present(&self.photo_taken_date)
            && present(&self.arweave_tx_id)
            && present(&self.thumbnail_hash)
            && coordinates_present)
        {
            return Err(ApiError::bad_request("Missing required fields for attestation."));
        }

        let recipient = validate_address("recipient", self.recipient.as_deref().unwrap_or_default())
            .map_err(|_| ApiError::bad_request("Invalid recipient ETH address."))?;
        let coordinates = validate_coordinates(self.coordinates.as_ref().unwrap_or(&Value::Null))?;

        Ok(PhotoAttestation {
            recipient,
            photo_taken_date: self.photo_taken_date.unwrap_or_default(),
            coordinates,
            arweave_tx_id: self.arweave_tx_id.unwrap_or_default(),
            thumbnail_hash: self.thumbnail_hash.unwrap_or_default(),
        })
    }
}

pub async fn create_attestation(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateAttestationRequest>,
) -> ApiResult<(StatusCode, Json<CreateAttestationResponse>)> {
    let attestation = req.validate()?;
    if !state.attestor.is_configured() {
        return Err(AttestationError::MissingSchema.into());
    }

    info!(
        "Creating attestation for {:?} referencing {}",
        attestation.recipient, attestation.arweave_tx_id
    );
    let receipt = state.attestor.attest(&attestation).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAttestationResponse {
            message: "Attestation created successfully".to_string(),
            attestation_uid: format!("{:?}", receipt.uid),
            transaction_hash: format!("{:?}", receipt.transaction_hash),
        }),
    ))
}
