//! Approval records persisted to a single JSON document
//!
//! The file holds `{"userApprovals": [...]}`. Every write rewrites the whole
//! document through a temporary file and a rename.

use super::{
    apply_status, merge_grant, record_key, ApprovalGrant, ApprovalRecord, ApprovalRepository,
    ApprovalStatus, StorageError, StorageResult,
};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    user_approvals: Vec<ApprovalRecord>,
}

pub struct JsonFileApprovalStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, ApprovalRecord>>,
}

impl JsonFileApprovalStore {
    /// Load the document at `path`, starting empty if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Document::default(),
            Ok(bytes) => serde_json::from_slice::<Document>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Approval store {} not found, starting empty", path.display());
                Document::default()
            }
            Err(e) => return Err(e.into()),
        };

        // Later entries win if the file holds duplicates for one address
        let records = document
            .user_approvals
            .into_iter()
            .map(|record| (record_key(&record.user_address), record))
            .collect::<BTreeMap<_, _>>();
        debug!("Loaded {} approval records from {}", records.len(), path.display());

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, ApprovalRecord>) -> StorageResult<()> {
        let document = Document {
            user_approvals: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ApprovalRepository for JsonFileApprovalStore {
    async fn find_by_address(&self, address: &str) -> StorageResult<Option<ApprovalRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&record_key(address)).cloned())
    }

    async fn upsert(&self, grant: ApprovalGrant) -> StorageResult<ApprovalRecord> {
        let key = record_key(&grant.user_address);
        let mut records = self.records.write().await;
        let record = merge_grant(records.get(&key), grant);
        let previous = records.insert(key.clone(), record.clone());

        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(previous) => records.insert(key, previous),
                None => records.remove(&key),
            };
            return Err(e);
        }
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
            .cloned()
            .ok_or_else(|| StorageError::NotFound(address.to_string()))?;
        let updated = apply_status(&current, status, at)?;
        records.insert(key.clone(), updated.clone());

        if let Err(e) = self.persist(&records).await {
            records.insert(key, current);
            return Err(e);
        }
        Ok(updated)
    }

    async fn list(&self) -> StorageResult<Vec<ApprovalRecord>> {
        let records = self.records.read().await;
        let mut list: Vec<ApprovalRecord> = records.values().cloned().collect();
        list.sort_by_key(|r| r.created_at);
        Ok(list)
    }
}
