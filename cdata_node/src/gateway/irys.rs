//! Irys bundler client
//!
//! Talks to an Irys node over its HTTP API. Uploads and approvals are signed
//! ANS-104 data items; funding is a native transfer on the payment chain that
//! is then registered with the node.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::Signer;
use ethers::types::{Address, TransactionRequest, U256, U64};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

use super::bundle::{DataItem, DataItemBuilder, Tag};
use super::{
    approval_tags, Approval, FundReceipt, GatewayError, GatewayResult, StorageGateway,
    UploadReceipt,
};
use crate::config::GatewaySettings;
use crate::wallet::ServerWallet;

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    addresses: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    id: Option<String>,
    timestamp: Option<u64>,
}

/// HTTP client for one Irys node and payment token
pub struct IrysGateway {
    http: reqwest::Client,
    node_url: String,
    token: String,
    rpc_url: String,
    wallet: Arc<ServerWallet>,
}

impl IrysGateway {
    pub fn new(settings: &GatewaySettings, wallet: Arc<ServerWallet>) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("cdata-node/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            node_url: settings.node_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            rpc_url: settings.rpc_url.clone(),
            wallet,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.node_url, path)
    }

    async fn ensure_success(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// Address on the payment chain that credits deposits to our balance
    pub async fn deposit_address(&self) -> GatewayResult<Address> {
        let response = self.http.get(self.url("/info")).send().await?;
        let info: NodeInfo = Self::ensure_success(response).await?.json().await?;
        let address = info
            .addresses
            .get(&self.token)
            .ok_or_else(|| GatewayError::UnsupportedToken(self.token.clone()))?;
        address
            .parse::<Address>()
            .map_err(|e| GatewayError::InvalidResponse(format!("deposit address: {}", e)))
    }

    async fn post_data_item(&self, item: DataItem) -> GatewayResult<UploadReceipt> {
        let item_id = item.id().to_string();
        let size = item.as_bytes().len();
        debug!("Posting data item {} ({} bytes) to {}", item_id, size, self.node_url);

        let response = self
            .http
            .post(self.url(&format!("/tx/{}", self.token)))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(item.into_bytes())
            .send()
            .await?;
        let body: TxResponse = Self::ensure_success(response).await?.json().await?;

        let id = body.id.unwrap_or(item_id);
        Ok(UploadReceipt {
            id,
            timestamp: body.timestamp,
        })
    }

    async fn get_approvals(&self, query: &[(&str, &str)], path: &str) -> GatewayResult<Vec<Approval>> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        let approvals = Self::ensure_success(response).await?.json().await?;
        Ok(approvals)
    }
}

fn parse_balance(value: &Value) -> GatewayResult<U256> {
    match value {
        Value::String(s) => U256::from_dec_str(s.trim())
            .map_err(|e| GatewayError::InvalidResponse(format!("balance '{}': {}", s, e))),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("balance '{}'", n))),
        other => Err(GatewayError::InvalidResponse(format!("balance {}", other))),
    }
}

#[async_trait]
impl StorageGateway for IrysGateway {
    fn token(&self) -> &str {
        &self.token
    }

    fn address(&self) -> String {
        self.wallet.irys_address()
    }

    async fn loaded_balance(&self) -> GatewayResult<U256> {
        let address = self.wallet.irys_address();
        let response = self
            .http
            .get(self.url(&format!("/account/balance/{}", self.token)))
            .query(&[("address", address.as_str())])
            .send()
            .await?;
        let body: BalanceResponse = Self::ensure_success(response).await?.json().await?;
        parse_balance(&body.balance)
    }

    async fn fund(&self, amount: U256) -> GatewayResult<FundReceipt> {
        if amount.is_zero() {
            return Err(GatewayError::Rpc("funding amount must be greater than zero".to_string()));
        }
        let deposit_to = self.deposit_address().await?;

        let provider = Provider::<Http>::try_from(self.rpc_url.as_str())
            .map_err(|e| GatewayError::Rpc(format!("invalid RPC url: {}", e)))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| GatewayError::Rpc(format!("failed to get chain ID: {}", e)))?;
        let signer = self.wallet.signer().clone().with_chain_id(chain_id.as_u64());
        let client = SignerMiddleware::new(provider, signer);

        let tx = TransactionRequest::new().to(deposit_to).value(amount);
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| GatewayError::Rpc(format!("failed to send funding transaction: {}", e)))?;
        let tx_id = format!("{:?}", pending.tx_hash());
        info!("Funding transaction {} sent to {:?}", tx_id, deposit_to);

        let receipt = pending
            .await
            .map_err(|e| GatewayError::Rpc(format!("failed to get confirmation: {}", e)))?
            .ok_or_else(|| GatewayError::Rpc(format!("funding transaction {} dropped", tx_id)))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(GatewayError::Rpc(format!("funding transaction {} reverted", tx_id)));
        }

        let response = self
            .http
            .post(self.url(&format!("/account/balance/{}", self.token)))
            .json(&serde_json::json!({ "tx_id": tx_id }))
            .send()
            .await?;
        if let Err(e) = Self::ensure_success(response).await {
            // The transfer is on-chain; the node also picks it up on its own scan
            warn!("Node did not acknowledge funding transaction {}: {}", tx_id, e);
        }

        Ok(FundReceipt {
            id: tx_id,
            quantity: amount,
            token: self.token.clone(),
        })
    }

    async fn upload(&self, data: Vec<u8>, tags: Vec<Tag>) -> GatewayResult<UploadReceipt> {
        let item = DataItemBuilder::new(data)
            .tags(tags)
            .random_anchor()
            .sign(&self.wallet)
            .await?;
        self.post_data_item(item).await
    }

    async fn create_approval(
        &self,
        approved_address: &str,
        amount: U256,
        expires_in_secs: Option<u64>,
    ) -> GatewayResult<UploadReceipt> {
        let item = DataItemBuilder::new(Vec::new())
            .tags(approval_tags(approved_address, amount, expires_in_secs))
            .random_anchor()
            .sign(&self.wallet)
            .await?;
        self.post_data_item(item).await
    }

    async fn created_approvals(&self) -> GatewayResult<Vec<Approval>> {
        let address = self.wallet.irys_address();
        self.get_approvals(
            &[("payingAddress", address.as_str()), ("token", self.token.as_str())],
            "/account/approvals/created",
        )
        .await
    }

    async fn received_approvals(&self, approved_address: &str) -> GatewayResult<Vec<Approval>> {
        self.get_approvals(
            &[("approvedAddress", approved_address), ("token", self.token.as_str())],
            "/account/approvals/get",
        )
        .await
    }
}
