//! Paid storage gateway
//!
//! The node stores data on Arweave through an Irys bundler paid from the
//! server wallet's prepaid balance. [`StorageGateway`] is the seam handlers
//! and the sponsorship flow talk to; [`irys::IrysGateway`] is the HTTP
//! implementation.

pub mod bundle;
pub mod irys;

use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bundle::{validate_tags, DataItem, DataItemBuilder, Tag};
pub use irys::IrysGateway;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("invalid tag: {0}")]
    InvalidTag(String),
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
    #[error("gateway has no deposit address for token {0}")]
    UnsupportedToken(String),
}

/// Receipt returned after a data item was accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: String,
    /// Milliseconds since epoch as reported by the gateway
    pub timestamp: Option<u64>,
}

/// Result of moving funds into the gateway balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundReceipt {
    /// Chain transaction hash of the deposit
    pub id: String,
    /// Deposited amount in atomic units
    pub quantity: U256,
    pub token: String,
}

/// Spending grant recorded by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    /// Approved amount in atomic units
    pub amount: String,
    pub paying_address: String,
    pub approved_address: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Operations the node needs from the storage-payment gateway
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Payment token name (e.g. `ethereum`, `base-eth`)
    fn token(&self) -> &str;

    /// Address the gateway bills uploads to
    fn address(&self) -> String;

    /// Prepaid balance of the server account, atomic units
    async fn loaded_balance(&self) -> GatewayResult<U256>;

    /// Deposit `amount` atomic units from the server wallet
    async fn fund(&self, amount: U256) -> GatewayResult<FundReceipt>;

    /// Sign and upload `data` as a data item
    async fn upload(&self, data: Vec<u8>, tags: Vec<Tag>) -> GatewayResult<UploadReceipt>;

    /// Allow `approved_address` to spend up to `amount` from the server balance
    async fn create_approval(
        &self,
        approved_address: &str,
        amount: U256,
        expires_in_secs: Option<u64>,
    ) -> GatewayResult<UploadReceipt>;

    /// Approvals paid by the server account
    async fn created_approvals(&self) -> GatewayResult<Vec<Approval>>;

    /// Approvals granted to `approved_address` by any payer
    async fn received_approvals(&self, approved_address: &str) -> GatewayResult<Vec<Approval>>;
}

/// Tags that turn an empty data item into an approval on the gateway
pub fn approval_tags(approved_address: &str, amount: U256, expires_in_secs: Option<u64>) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new("Approval", amount.to_string()),
        Tag::new("Approved-Address", approved_address),
    ];
    if let Some(secs) = expires_in_secs {
        tags.push(Tag::new("Expire-Seconds", secs.to_string()));
    }
    tags
}
