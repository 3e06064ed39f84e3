//! Sponsored uploads
//!
//! The server wallet keeps a prepaid gateway balance and lets individual users
//! spend from it through gateway approvals. Each approval is mirrored in the
//! approval store.

use ethers::types::U256;
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::config::SponsorshipSettings;
use crate::gateway::{GatewayError, StorageGateway};
use crate::storage::{
    ApprovalGrant, ApprovalRecord, ApprovalRepository, ApprovalStatus, StorageError,
};
use crate::wallet::ServerWallet;

#[derive(Debug, Error)]
pub enum SponsorshipError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("approval store error: {0}")]
    Storage(#[from] StorageError),
}

pub type SponsorshipResult<T> = std::result::Result<T, SponsorshipError>;

/// Identity-provider details attached to an approval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub provider_user_id: Option<String>,
    pub email: Option<String>,
    pub social_provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsoredUpload {
    pub approval_tx_id: String,
    pub approved_amount_atomic: U256,
    pub sponsor_evm_address: String,
    pub sponsor_irys_address: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApproval {
    pub record: ApprovalRecord,
    /// The user already held a live approval and nothing was created
    pub already_active: bool,
}

pub struct SponsorshipService {
    gateway: Arc<dyn StorageGateway>,
    approvals: Arc<dyn ApprovalRepository>,
    wallet: Arc<ServerWallet>,
    settings: SponsorshipSettings,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SponsorshipService {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        approvals: Arc<dyn ApprovalRepository>,
        wallet: Arc<ServerWallet>,
        settings: SponsorshipSettings,
    ) -> Self {
        Self {
            gateway,
            approvals,
            wallet,
            settings,
        }
    }

    async fn grant(
        &self,
        user_address: &str,
        identity: UserIdentity,
    ) -> SponsorshipResult<ApprovalRecord> {
        let amount = self.settings.approval_amount_atomic;
        let duration_secs = self.settings.delegation_duration.num_seconds().max(0) as u64;

        let granted_at = now_ms();
        let receipt = self
            .gateway
            .create_approval(user_address, amount, Some(duration_secs))
            .await?;
        info!(
            "Created approval {} for {} ({} atomic, {}s)",
            receipt.id, user_address, amount, duration_secs
        );

        let record = self
            .approvals
            .upsert(ApprovalGrant {
                user_address: user_address.to_string(),
                provider_user_id: identity.provider_user_id,
                provider_user_email: identity.email,
                social_provider: identity.social_provider,
                delegation_id: receipt.id,
                expires_at: granted_at + self.settings.delegation_duration.num_milliseconds(),
                granted_at,
            })
            .await?;
        Ok(record)
    }

    /// Grant `user_address` a fresh spending approval from the server balance
    pub async fn initiate(&self, user_address: &str) -> SponsorshipResult<SponsoredUpload> {
        let record = self.grant(user_address, UserIdentity::default()).await?;
        Ok(SponsoredUpload {
            approval_tx_id: record.delegation_id,
            approved_amount_atomic: self.settings.approval_amount_atomic,
            sponsor_evm_address: self.wallet.checksum_address(),
            sponsor_irys_address: self.gateway.address(),
            expires_at: record.expires_at,
        })
    }

    /// Approve the user unless a live approval already exists
    pub async fn auto_approve(
        &self,
        user_address: &str,
        identity: UserIdentity,
    ) -> SponsorshipResult<AutoApproval> {
        let now = now_ms();
        if let Some(existing) = self.approvals.find_by_address(user_address).await? {
            if existing.is_live(now) {
                info!(
                    "User {} already has an active delegation: {}",
                    user_address, existing.delegation_id
                );
                return Ok(AutoApproval {
                    record: existing,
                    already_active: true,
                });
            }
            if existing.status == ApprovalStatus::Active {
                warn!(
                    "Delegation {} for {} expired, marking it expired",
                    existing.delegation_id, user_address
                );
                self.approvals
                    .set_status(user_address, ApprovalStatus::Expired, now)
                    .await?;
            }
        }

        info!("No active delegation for {}, creating one", user_address);
        let record = self.grant(user_address, identity).await?;
        Ok(AutoApproval {
            record,
            already_active: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Approval, FundReceipt, GatewayResult, Tag, UploadReceipt};
    use crate::storage::MemoryApprovalStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const USER: &str = "0x00000000000000000000000000000000000000Aa";

    #[derive(Default)]
    struct CountingGateway {
        approvals: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl StorageGateway for CountingGateway {
        fn token(&self) -> &str {
            "ethereum"
        }
        fn address(&self) -> String {
            "0xsponsor".to_string()
        }
        async fn loaded_balance(&self) -> GatewayResult<U256> {
            Ok(U256::zero())
        }
        async fn fund(&self, amount: U256) -> GatewayResult<FundReceipt> {
            Ok(FundReceipt {
                id: "fund".to_string(),
                quantity: amount,
                token: "ethereum".to_string(),
            })
        }
        async fn upload(&self, _data: Vec<u8>, _tags: Vec<Tag>) -> GatewayResult<UploadReceipt> {
            unreachable!("sponsorship never uploads data")
        }
        async fn create_approval(
            &self,
            _approved_address: &str,
            _amount: U256,
            _expires_in_secs: Option<u64>,
        ) -> GatewayResult<UploadReceipt> {
            if self.fail {
                return Err(GatewayError::Rejected {
                    status: 402,
                    body: "insufficient balance".to_string(),
                });
            }
            let n = self.approvals.fetch_add(1, Ordering::SeqCst);
            Ok(UploadReceipt {
                id: format!("approval-{}", n),
                timestamp: None,
            })
        }
        async fn created_approvals(&self) -> GatewayResult<Vec<Approval>> {
            Ok(Vec::new())
        }
        async fn received_approvals(&self, _approved_address: &str) -> GatewayResult<Vec<Approval>> {
            Ok(Vec::new())
        }
    }

    fn service(gateway: Arc<CountingGateway>, store: Arc<MemoryApprovalStore>) -> SponsorshipService {
        SponsorshipService::new(
            gateway,
            store,
            Arc::new(ServerWallet::from_private_key(KEY).unwrap()),
            SponsorshipSettings {
                approval_amount_atomic: U256::exp10(16),
                delegation_duration: chrono::Duration::days(30),
            },
        )
    }

    #[tokio::test]
    async fn test_initiate_twice_keeps_one_record() {
        let gateway = Arc::new(CountingGateway::default());
        let store = Arc::new(MemoryApprovalStore::new());
        let service = service(gateway.clone(), store.clone());

        let first = service.initiate(USER).await.unwrap();
        let second = service.initiate(USER).await.unwrap();

        assert_eq!(first.approval_tx_id, "approval-0");
        assert_eq!(second.approval_tx_id, "approval-1");
        assert_eq!(second.approved_amount_atomic, U256::exp10(16));
        assert_eq!(second.sponsor_evm_address, "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23");
        assert_eq!(second.sponsor_irys_address, "0xsponsor");
        assert_eq!(gateway.approvals.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_auto_approve_reuses_live_record() {
        let gateway = Arc::new(CountingGateway::default());
        let store = Arc::new(MemoryApprovalStore::new());
        let service = service(gateway.clone(), store);

        let identity = UserIdentity {
            provider_user_id: Some("did:privy:1".to_string()),
            email: Some("user@example.com".to_string()),
            social_provider: Some("google".to_string()),
        };
        let first = service.auto_approve(USER, identity).await.unwrap();
        assert!(!first.already_active);
        assert_eq!(first.record.social_provider.as_deref(), Some("google"));
        assert!(first.record.expires_at > now_ms() + 29 * 24 * 3600 * 1000);

        let second = service
            .auto_approve(&USER.to_lowercase(), UserIdentity::default())
            .await
            .unwrap();
        assert!(second.already_active);
        assert_eq!(second.record.delegation_id, first.record.delegation_id);
        assert_eq!(gateway.approvals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_approve_replaces_stale_record() {
        let gateway = Arc::new(CountingGateway::default());
        let store = Arc::new(MemoryApprovalStore::new());
        store
            .upsert(ApprovalGrant {
                user_address: USER.to_string(),
                provider_user_id: None,
                provider_user_email: None,
                social_provider: Some("wallet".to_string()),
                delegation_id: "old".to_string(),
                expires_at: 1_000,
                granted_at: 0,
            })
            .await
            .unwrap();
        let service = service(gateway, store.clone());

        let approval = service.auto_approve(USER, UserIdentity::default()).await.unwrap();
        assert!(!approval.already_active);
        assert_eq!(approval.record.delegation_id, "approval-0");
        assert_eq!(approval.record.status, ApprovalStatus::Active);
        assert_eq!(approval.record.created_at, 0);
        assert_eq!(approval.record.social_provider.as_deref(), Some("wallet"));
    }

    #[tokio::test]
    async fn test_gateway_failure_records_nothing() {
        let gateway = Arc::new(CountingGateway {
            fail: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryApprovalStore::new());
        let service = service(gateway, store.clone());

        let err = service.initiate(USER).await.unwrap_err();
        assert!(matches!(err, SponsorshipError::Gateway(GatewayError::Rejected { status: 402, .. })));
        assert!(store.is_empty().await);
    }
}
