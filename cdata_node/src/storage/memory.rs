use super::{
    apply_status, merge_grant, record_key, ApprovalGrant, ApprovalRecord, ApprovalRepository,
    ApprovalStatus, StorageError, StorageResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory approval store, for tests and ephemeral nodes
#[derive(Clone)]
pub struct MemoryApprovalStore {
    records: Arc<RwLock<HashMap<String, ApprovalRecord>>>,
}

impl Default for MemoryApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ApprovalRepository for MemoryApprovalStore {
    async fn find_by_address(&self, address: &str) -> StorageResult<Option<ApprovalRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&record_key(address)).cloned())
    }

    async fn upsert(&self, grant: ApprovalGrant) -> StorageResult<ApprovalRecord> {
        let key = record_key(&grant.user_address);
        let mut records = self.records.write().await;
        let record = merge_grant(records.get(&key), grant);
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn set_status(
        &self,
        address: &str,
        status: ApprovalStatus,
        at: i64,
    ) -> StorageResult<ApprovalRecord> {
        let key = record_key(address);
        let mut records = self.records.write().await;
        let current = records
            .get(&key)
            .ok_or_else(|| StorageError::NotFound(address.to_string()))?;
        let updated = apply_status(current, status, at)?;
        records.insert(key, updated.clone());
        Ok(updated)
    }

    async fn list(&self) -> StorageResult<Vec<ApprovalRecord>> {
        let records = self.records.read().await;
        let mut list: Vec<ApprovalRecord> = records.values().cloned().collect();
        list.sort_by_key(|r| r.created_at);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::grant;
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_case_insensitive() {
        let store = MemoryApprovalStore::new();
        store.upsert(grant("0xAbCd", "d1", 1)).await.unwrap();
        store.upsert(grant("0xabcd", "d2", 2)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let record = store.find_by_address("0xABCD").await.unwrap().unwrap();
        assert_eq!(record.delegation_id, "d2");
        assert_eq!(record.user_address, "0xabcd");
        assert_eq!(record.created_at, 1);
    }

    #[tokio::test]
    async fn test_set_status() {
        let store = MemoryApprovalStore::new();
        assert!(matches!(
            store.set_status("0x1", ApprovalStatus::Expired, 0).await,
            Err(StorageError::NotFound(_))
        ));

        store.upsert(grant("0x1", "d1", 1)).await.unwrap();
        let expired = store.set_status("0x1", ApprovalStatus::Expired, 5).await.unwrap();
        assert_eq!(expired.status, ApprovalStatus::Expired);
        assert_eq!(expired.last_updated_at, 5);

        let err = store.set_status("0x1", ApprovalStatus::Active, 6).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_record() {
        let store = MemoryApprovalStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.upsert(grant("0xfeed", &format!("d{}", i), i)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
