use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::Signer;
use ethers::types::{Address, Bytes, Log, TransactionRequest, H256, U256, U64};
use ethers::utils::{id, keccak256};
use log::{debug, info};
use std::convert::TryFrom;
use std::sync::Arc;

use super::{AttestationError, AttestationReceipt, AttestationResult, Attestor, PhotoAttestation};
use crate::config::AttestationSettings;
use crate::wallet::ServerWallet;

const ATTEST_SIGNATURE: &str = "attest((bytes32,(address,uint64,bool,bytes32,bytes,uint256)))";
const ATTESTED_EVENT: &str = "Attested(address,address,bytes32,bytes32)";

/// Build calldata for `EAS.attest` with a non-expiring, revocable request
/// that carries no reference UID and no value
pub fn attest_calldata(schema: H256, recipient: Address, data: Vec<u8>) -> Bytes {
    let request = Token::Tuple(vec![
        Token::FixedBytes(schema.as_bytes().to_vec()),
        Token::Tuple(vec![
            Token::Address(recipient),
            Token::Uint(U256::zero()),
            Token::Bool(true),
            Token::FixedBytes(vec![0u8; 32]),
            Token::Bytes(data),
            Token::Uint(U256::zero()),
        ]),
    ]);

    let mut calldata = id(ATTEST_SIGNATURE).to_vec();
    calldata.extend(abi::encode(&[request]));
    Bytes::from(calldata)
}

/// Find the attestation UID in the `Attested` log emitted by `contract`
pub fn uid_from_logs(logs: &[Log], contract: Address) -> Option<H256> {
    let topic = H256::from(keccak256(ATTESTED_EVENT));
    logs.iter()
        .filter(|log| log.address == contract)
        .filter(|log| log.topics.first() == Some(&topic))
        .find_map(|log| log.data.get(..32).map(H256::from_slice))
}

/// Attestor backed by an EAS contract
pub struct EasAttestor {
    provider: Provider<Http>,
    wallet: Arc<ServerWallet>,
    contract: Address,
    schema_uid: Option<H256>,
    chain_id: Option<u64>,
}

impl EasAttestor {
    pub fn new(settings: &AttestationSettings, wallet: Arc<ServerWallet>) -> AttestationResult<Self> {
        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .map_err(|e| AttestationError::Rpc(format!("invalid RPC url: {}", e)))?;
        Ok(Self {
            provider,
            wallet,
            contract: settings.contract,
            schema_uid: settings.schema_uid,
            chain_id: settings.chain_id,
        })
    }

    async fn chain_id(&self) -> AttestationResult<u64> {
        if let Some(chain_id) = self.chain_id {
            return Ok(chain_id);
        }
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| AttestationError::Rpc(format!("failed to get chain ID: {}", e)))?;
        Ok(chain_id.as_u64())
    }
}

#[async_trait]
impl Attestor for EasAttestor {
    fn is_configured(&self) -> bool {
        self.schema_uid.is_some()
    }

    async fn attest(&self, attestation: &PhotoAttestation) -> AttestationResult<AttestationReceipt> {
        let schema = self.schema_uid.ok_or(AttestationError::MissingSchema)?;
        let chain_id = self.chain_id().await?;

        let signer = self.wallet.signer().clone().with_chain_id(chain_id);
        let client = SignerMiddleware::new(self.provider.clone(), signer);

        let calldata = attest_calldata(schema, attestation.recipient, attestation.encode_data());
        let tx = TransactionRequest::new().to(self.contract).data(calldata);
        debug!("Submitting attestation for {:?} on chain {}", attestation.recipient, chain_id);

        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| AttestationError::Rpc(format!("failed to send attestation: {}", e)))?;
        let tx_hash = pending.tx_hash();
        info!("Attestation transaction sent: {:?}", tx_hash);

        let receipt = pending
            .await
            .map_err(|e| AttestationError::Rpc(format!("failed to get confirmation: {}", e)))?
            .ok_or_else(|| AttestationError::Rpc(format!("transaction {:?} dropped", tx_hash)))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(AttestationError::Reverted(tx_hash));
        }

        let uid = uid_from_logs(&receipt.logs, self.contract)
            .ok_or(AttestationError::MissingEvent(tx_hash))?;
        info!("Attestation {:?} confirmed in block {:?}", uid, receipt.block_number);
        Ok(AttestationReceipt {
            uid,
            transaction_hash: tx_hash,
        })
    }
}
