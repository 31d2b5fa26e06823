//! Persistence for pending-action records.

use async_lock::Mutex;
use async_trait::async_trait;
use ritual_core::effects::StorageEffects;
use ritual_core::{PendingActionRecord, PhaseKey, Result, RitualError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Storage interface for the `(ritual_id, phase)` → last outcome mapping.
#[async_trait]
pub trait PendingActionStore: Send + Sync {
    /// Persist `record`, replacing whatever was stored for its key.
    async fn put(&self, record: &PendingActionRecord) -> Result<()>;
    /// Drop the record for `key`, if any.
    async fn remove(&self, key: &PhaseKey) -> Result<()>;
    /// Every stored record.
    async fn load_all(&self) -> Result<Vec<PendingActionRecord>>;
}

/// Process-lifetime store.
#[derive(Default)]
pub struct MemoryPendingActionStore {
    records: Mutex<BTreeMap<PhaseKey, PendingActionRecord>>,
}

impl MemoryPendingActionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingActionStore for MemoryPendingActionStore {
    async fn put(&self, record: &PendingActionRecord) -> Result<()> {
        self.records.lock().await.insert(record.key, record.clone());
        Ok(())
    }

    async fn remove(&self, key: &PhaseKey) -> Result<()> {
        self.records.lock().await.remove(key);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PendingActionRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

/// Durable store over `StorageEffects`, one bincode blob per key.
pub struct StoragePendingActionStore<S: StorageEffects + ?Sized> {
    storage: Arc<S>,
    prefix: String,
}

impl<S: StorageEffects + ?Sized> StoragePendingActionStore<S> {
    /// Store under the `txm/pending` prefix.
    pub fn new_default(storage: Arc<S>) -> Self {
        Self::new(storage, "txm/pending")
    }

    /// Store under a custom prefix.
    pub fn new(storage: Arc<S>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    fn key_for(&self, key: &PhaseKey) -> String {
        format!("{}/{}", self.prefix, key.storage_suffix())
    }
}

#[async_trait]
impl<S: StorageEffects + ?Sized> PendingActionStore for StoragePendingActionStore<S> {
    async fn put(&self, record: &PendingActionRecord) -> Result<()> {
        let bytes =
            bincode::serialize(record).map_err(|e| RitualError::serialization(e.to_string()))?;
        self.storage.store(&self.key_for(&record.key), bytes).await?;
        Ok(())
    }

    async fn remove(&self, key: &PhaseKey) -> Result<()> {
        self.storage.remove(&self.key_for(key)).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PendingActionRecord>> {
        let prefix = format!("{}/", self.prefix);
        let mut records = Vec::new();
        for storage_key in self.storage.list_keys(Some(&prefix)).await? {
            let Some(blob) = self.storage.retrieve(&storage_key).await? else {
                continue;
            };
            match bincode::deserialize::<PendingActionRecord>(&blob) {
                Ok(record) if self.key_for(&record.key) == storage_key => records.push(record),
                Ok(record) => {
                    warn!(%storage_key, key = %record.key, "pending record stored under foreign key; skipping");
                }
                Err(e) => {
                    warn!(%storage_key, error = %e, "unreadable pending record; skipping");
                }
            }
        }
        records.sort_by_key(|r| r.key);
        Ok(records)
    }
}
