//! On-chain photo attestations
//!
//! A photo attestation links an uploaded artifact (its Arweave transaction id
//! and thumbnail hash) to a recipient address, a capture date and a location.

pub mod eas;

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, H256};
use thiserror::Error;

pub use eas::EasAttestor;

/// Schema registered for photo attestations
pub const PHOTO_SCHEMA: &str =
    "string photoTakenDate,string[] coordinates,string arweaveTxId,string thumbnailHash";

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("EAS schema UID is not configured")]
    MissingSchema,
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("attestation transaction {0:?} reverted")]
    Reverted(H256),
    #[error("attestation transaction {0:?} emitted no Attested event")]
    MissingEvent(H256),
}

pub type AttestationResult<T> = std::result::Result<T, AttestationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoAttestation {
    pub recipient: Address,
    pub photo_taken_date: String,
    /// Latitude and longitude, as submitted
    pub coordinates: [String; 2],
    pub arweave_tx_id: String,
    pub thumbnail_hash: String,
}

impl PhotoAttestation {
    /// ABI-encode the attestation body according to [`PHOTO_SCHEMA`]
    pub fn encode_data(&self) -> Vec<u8> {
        abi::encode(&[
            Token::String(self.photo_taken_date.clone()),
            Token::Array(
                self.coordinates
                    .iter()
                    .map(|c| Token::String(c.clone()))
                    .collect(),
            ),
            Token::String(self.arweave_tx_id.clone()),
            Token::String(self.thumbnail_hash.clone()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationReceipt {
    pub uid: H256,
    pub transaction_hash: H256,
}

#[async_trait]
pub trait Attestor: Send + Sync {
    /// Whether a schema UID is available to attest against
    fn is_configured(&self) -> bool;

    /// Submit the attestation and wait for it to be mined
    async fn attest(&self, attestation: &PhotoAttestation) -> AttestationResult<AttestationReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::ParamType;

    #[test]
    fn test_encode_data_matches_schema() {
        let attestation = PhotoAttestation {
            recipient: Address::zero(),
            photo_taken_date: "2024-05-01T10:00:00Z".to_string(),
            coordinates: ["40.7128".to_string(), "-74.0060".to_string()],
            arweave_tx_id: "tx123".to_string(),
            thumbnail_hash: "abcd".to_string(),
        };
        let encoded = attestation.encode_data();

        let decoded = abi::decode(
            &[
                ParamType::String,
                ParamType::Array(Box::new(ParamType::String)),
                ParamType::String,
                ParamType::String,
            ],
            &encoded,
        )
        .unwrap();
        assert_eq!(decoded[0], Token::String("2024-05-01T10:00:00Z".to_string()));
        assert_eq!(
            decoded[1],
            Token::Array(vec![
                Token::String("40.7128".to_string()),
                Token::String("-74.0060".to_string())
            ])
        );
        assert_eq!(decoded[2], Token::String("tx123".to_string()));
        assert_eq!(decoded[3], Token::String("abcd".to_string()));
    }
}
