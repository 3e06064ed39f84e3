//! Shared fixtures for router-level tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use cdata_node::api::{create_router, AppState};
use cdata_node::attestation::{
    AttestationReceipt, AttestationResult, Attestor, PhotoAttestation,
};
use cdata_node::config::{RawSettings, Settings};
use cdata_node::gateway::{
    Approval, FundReceipt, GatewayError, GatewayResult, StorageGateway, Tag, UploadReceipt,
};
use cdata_node::storage::MemoryApprovalStore;
use cdata_node::wallet::ServerWallet;
use ethers::types::{H256, U256};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const SERVER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const SERVER_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";
pub const USER_KEY: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
pub const SCHEMA_UID: &str = "0x1b2ee0ba4ed4a5ea4bd3ac1c5bd3ae1b1c5e86a2aa1ee1d5dbe29ef3c4d1a9aa";
pub const BOUNDARY: &str = "cdata-test-boundary";

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub data: Vec<u8>,
    pub tags: Vec<Tag>,
}

impl RecordedUpload {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }
}

/// In-process stand-in for the Irys node
#[derive(Default)]
pub struct FakeGateway {
    pub balance: Mutex<U256>,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub approvals: Mutex<Vec<Approval>>,
    pub funded: Mutex<Vec<U256>>,
    pub fail_uploads: AtomicBool,
    pub fail_approvals: AtomicBool,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn with_balance(balance: U256) -> Self {
        let gateway = Self::default();
        *gateway.balance.lock().unwrap() = balance;
        gateway
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn approval_count(&self) -> usize {
        self.approvals.lock().unwrap().len()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl StorageGateway for FakeGateway {
    fn token(&self) -> &str {
        "base-eth"
    }

    fn address(&self) -> String {
        SERVER_ADDRESS.to_lowercase()
    }

    async fn loaded_balance(&self) -> GatewayResult<U256> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn fund(&self, amount: U256) -> GatewayResult<FundReceipt> {
        self.funded.lock().unwrap().push(amount);
        let mut balance = self.balance.lock().unwrap();
        *balance = *balance + amount;
        Ok(FundReceipt {
            id: self.next_id("fund"),
            quantity: amount,
            token: "base-eth".to_string(),
        })
    }

    async fn upload(&self, data: Vec<u8>, tags: Vec<Tag>) -> GatewayResult<UploadReceipt> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 402,
                body: "Not enough balance for transaction".to_string(),
            });
        }
        self.uploads.lock().unwrap().push(RecordedUpload { data, tags });
        Ok(UploadReceipt {
            id: self.next_id("item"),
            timestamp: Some(1_700_000_000_000),
        })
    }

    async fn create_approval(
        &self,
        approved_address: &str,
        amount: U256,
        _expires_in_secs: Option<u64>,
    ) -> GatewayResult<UploadReceipt> {
        if self.fail_approvals.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 402,
                body: "Not enough balance for approval".to_string(),
            });
        }
        self.approvals.lock().unwrap().push(Approval {
            amount: amount.to_string(),
            paying_address: self.address(),
            approved_address: approved_address.to_string(),
            token: Some("base-eth".to_string()),
            expires_at: None,
            timestamp: None,
        });
        Ok(UploadReceipt {
            id: self.next_id("approval"),
            timestamp: None,
        })
    }

    async fn created_approvals(&self) -> GatewayResult<Vec<Approval>> {
        Ok(self.approvals.lock().unwrap().clone())
    }

    async fn received_approvals(&self, approved_address: &str) -> GatewayResult<Vec<Approval>> {
        Ok(self
            .approvals
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.approved_address.eq_ignore_ascii_case(approved_address))
            .cloned()
            .collect())
    }
}

/// Attestor that never touches a chain
pub struct FakeAttestor {
    pub configured: bool,
    pub calls: Mutex<Vec<PhotoAttestation>>,
}

impl FakeAttestor {
    pub fn new(configured: bool) -> Self {
        Self {
            configured,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Attestor for FakeAttestor {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn attest(&self, attestation: &PhotoAttestation) -> AttestationResult<AttestationReceipt> {
        self.calls.lock().unwrap().push(attestation.clone());
        Ok(AttestationReceipt {
            uid: H256::repeat_byte(0xab),
            transaction_hash: H256::repeat_byte(0xcd),
        })
    }
}

pub fn test_settings() -> Settings {
    Settings::resolve(RawSettings {
        server_evm_private_key: Some(SERVER_KEY.to_string()),
        rpc_url: Some("http://127.0.0.1:8545".to_string()),
        eas_schema_uid: Some(SCHEMA_UID.to_string()),
        allowed_users: Some("user1_temp_id, user2_temp_id".to_string()),
        ..Default::default()
    })
    .expect("test settings resolve")
}

pub struct TestApp {
    pub router: Router,
    pub gateway: Arc<FakeGateway>,
    pub attestor: Arc<FakeAttestor>,
    pub approvals: Arc<MemoryApprovalStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(FakeGateway::with_balance(U256::exp10(17)), FakeAttestor::new(true))
    }

    pub fn build(gateway: FakeGateway, attestor: FakeAttestor) -> Self {
        let settings = test_settings();
        let wallet = Arc::new(ServerWallet::from_private_key(SERVER_KEY).unwrap());
        let gateway = Arc::new(gateway);
        let attestor = Arc::new(attestor);
        let approvals = Arc::new(MemoryApprovalStore::new());

        let state = AppState::new(
            settings,
            wallet,
            gateway.clone(),
            attestor.clone(),
            approvals.clone(),
        );
        Self {
            router: create_router(state),
            gateway,
            attestor,
            approvals,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> (u16, serde_json::Value) {
        let response = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        json_body(response).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        json_body(self.send(request).await).await
    }

    /// POST `body` as-is, with an optional content type
    pub async fn post_raw(
        &self,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> (u16, serde_json::Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        json_body(self.send(request).await).await
    }

    pub async fn post_multipart(&self, uri: &str, form: MultipartForm) -> (u16, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.finish()))
            .unwrap();
        json_body(self.send(request).await).await
    }
}

pub async fn json_body(response: Response<Body>) -> (u16, serde_json::Value) {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

/// Minimal multipart/form-data encoder
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

/// A user wallet and a personal-sign signature over `metadata`
pub async fn signed_metadata(metadata: &str) -> (ServerWallet, String) {
    let user = ServerWallet::from_private_key(USER_KEY).unwrap();
    let signature = user.sign_message(metadata.as_bytes()).await.unwrap();
    (user, format!("0x{}", signature))
}
