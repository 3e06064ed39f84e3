//! Approval records
//!
//! The node keeps an advisory record per user of the spending grant it
//! created on the storage gateway. The gateway remains the authority; these
//! records let the node answer "is this user already approved" without a
//! gateway round trip.

pub mod json_file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use json_file::JsonFileApprovalStore;
pub use memory::MemoryApprovalStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no approval record for {0}")]
    NotFound(String),
    #[error("approval status cannot change from {from} to {to}")]
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Active,
    Expired,
    Revoked,
}

impl ApprovalStatus {
    /// `expired` and `revoked` are terminal
    pub fn can_transition_to(self, next: ApprovalStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (ApprovalStatus::Active, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalStatus::Active => "active",
            ApprovalStatus::Expired => "expired",
            ApprovalStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// Persisted approval of one user address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub user_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_provider: Option<String>,
    pub delegation_id: String,
    /// Milliseconds since epoch
    pub created_at: i64,
    pub last_updated_at: i64,
    pub expires_at: i64,
    pub status: ApprovalStatus,
}

impl ApprovalRecord {
    /// Active and not yet past its expiry
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.status == ApprovalStatus::Active && self.expires_at > now_ms
    }
}

/// A freshly created gateway approval to record for a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalGrant {
    pub user_address: String,
    pub provider_user_id: Option<String>,
    pub provider_user_email: Option<String>,
    pub social_provider: Option<String>,
    pub delegation_id: String,
    pub expires_at: i64,
    /// When the grant was made, milliseconds since epoch
    pub granted_at: i64,
}

/// Records are keyed by lowercased address
pub fn record_key(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Merge a grant into the existing record for the same address, if any
pub(crate) fn merge_grant(existing: Option<&ApprovalRecord>, grant: ApprovalGrant) -> ApprovalRecord {
    match existing {
        Some(current) => {
            let status = if current.delegation_id == grant.delegation_id {
                current.status
            } else {
                ApprovalStatus::Active
            };
            ApprovalRecord {
                user_address: grant.user_address,
                provider_user_id: grant.provider_user_id.or_else(|| current.provider_user_id.clone()),
                provider_user_email: grant
                    .provider_user_email
                    .or_else(|| current.provider_user_email.clone()),
                social_provider: grant.social_provider.or_else(|| current.social_provider.clone()),
                delegation_id: grant.delegation_id,
                created_at: current.created_at,
                last_updated_at: grant.granted_at,
                expires_at: grant.expires_at,
                status,
            }
        }
        None => ApprovalRecord {
            user_address: grant.user_address,
            provider_user_id: grant.provider_user_id,
            provider_user_email: grant.provider_user_email,
            social_provider: grant.social_provider,
            delegation_id: grant.delegation_id,
            created_at: grant.granted_at,
            last_updated_at: grant.granted_at,
            expires_at: grant.expires_at,
            status: ApprovalStatus::Active,
        },
    }
}

pub(crate) fn apply_status(
    record: &ApprovalRecord,
    status: ApprovalStatus,
    at: i64,
) -> StorageResult<ApprovalRecord> {
    if !record.status.can_transition_to(status) {
        return Err(StorageError::InvalidTransition {
            from: record.status,
            to: status,
        });
    }
    Ok(ApprovalRecord {
        status,
        last_updated_at: at,
        ..record.clone()
    })
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Case-insensitive lookup
    async fn find_by_address(&self, address: &str) -> StorageResult<Option<ApprovalRecord>>;

    /// Insert or update the single record for the grant's address
    async fn upsert(&self, grant: ApprovalGrant) -> StorageResult<ApprovalRecord>;

    /// Move the record to `status`; terminal states cannot be left
    async fn set_status(
        &self,
        address: &str,
        status: ApprovalStatus,
        at: i64,
    ) -> StorageResult<ApprovalRecord>;

    async fn list(&self) -> StorageResult<Vec<ApprovalRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn grant(address: &str, delegation: &str, at: i64) -> ApprovalGrant {
        ApprovalGrant {
            user_address: address.to_string(),
            provider_user_id: None,
            provider_user_email: None,
            social_provider: None,
            delegation_id: delegation.to_string(),
            expires_at: at + 1_000,
            granted_at: at,
        }
    }

    #[test]
    fn test_status_transitions() {
        use ApprovalStatus::*;
        assert!(Active.can_transition_to(Expired));
        assert!(Active.can_transition_to(Revoked));
        assert!(Expired.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Active));
        assert!(!Revoked.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Revoked));
    }

    #[test]
    fn test_merge_keeps_created_at() {
        let first = merge_grant(None, grant("0xAbC", "d1", 100));
        assert_eq!(first.status, ApprovalStatus::Active);
        assert_eq!(first.created_at, 100);

        let expired = apply_status(&first, ApprovalStatus::Expired, 150).unwrap();
        let same = merge_grant(Some(&expired), grant("0xAbC", "d1", 200));
        assert_eq!(same.status, ApprovalStatus::Expired);

        let renewed = merge_grant(Some(&expired), grant("0xAbC", "d2", 300));
        assert_eq!(renewed.status, ApprovalStatus::Active);
        assert_eq!(renewed.created_at, 100);
        assert_eq!(renewed.last_updated_at, 300);
        assert_eq!(renewed.delegation_id, "d2");
    }

    #[test]
    fn test_merge_keeps_identity_fields() {
        let mut with_identity = grant("0xabc", "d1", 0);
        with_identity.social_provider = Some("google".to_string());
        with_identity.provider_user_email = Some("a@b.c".to_string());
        let first = merge_grant(None, with_identity);

        let second = merge_grant(Some(&first), grant("0xabc", "d2", 10));
        assert_eq!(second.social_provider.as_deref(), Some("google"));
        assert_eq!(second.provider_user_email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_is_live() {
        let record = merge_grant(None, grant("0xabc", "d1", 0));
        assert!(record.is_live(999));
        assert!(!record.is_live(1_000));
        let revoked = apply_status(&record, ApprovalStatus::Revoked, 1).unwrap();
        assert!(!revoked.is_live(1));
        assert!(apply_status(&revoked, ApprovalStatus::Active, 2).is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let record = merge_grant(None, grant("0xAbC", "d1", 5));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userAddress"], "0xAbC");
        assert_eq!(json["delegationId"], "d1");
        assert_eq!(json["createdAt"], 5);
        assert_eq!(json["lastUpdatedAt"], 5);
        assert_eq!(json["expiresAt"], 1_005);
        assert_eq!(json["status"], "active");
        assert!(json.get("providerUserId").is_none());
    }
}
