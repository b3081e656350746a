//! Offline-first record queue.
//!
//! Each record kind is persisted as one JSON list under its own key, and the
//! whole list is rewritten on every mutation. All read-modify-write sequences
//! run under one mutex so concurrent `append` and `mark_synced` calls never
//! lose each other's updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::mapping::FieldMapping;
use crate::models::{KindStats, QueueStats, QueuedRecord, RecordKind, SyncMeta};
use crate::storage::KeyValueStore;

pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self, kind: RecordKind) -> Result<Vec<QueuedRecord>, AppError> {
        match self.store.get(kind.storage_key()).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, kind: RecordKind, records: &[QueuedRecord]) -> Result<(), AppError> {
        let blob = serde_json::to_string(records)?;
        self.store.set(kind.storage_key(), &blob).await
    }

    /// Queue a new record.
    ///
    /// The payload is first checked against the required fields of the
    /// kind's built-in mapping; a missing or null one fails with
    /// `BadRequest` and nothing is stored. Fails with `StorageUnavailable`
    /// if the record could not be persisted. No id is handed out in either
    /// case.
    pub async fn append(
        &self,
        kind: RecordKind,
        payload: Map<String, Value>,
    ) -> Result<QueuedRecord, AppError> {
        let missing = FieldMapping::for_kind(kind).missing_required(&payload);
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "{} is missing required fields: {}",
                kind,
                missing.join(", ")
            )));
        }

        let _guard = self.write_lock.lock().await;
        let mut records = self.load(kind).await?;

        let taken: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let mut id = generate_id();
        while taken.contains(id.as_str()) {
            id = generate_id();
        }

        let record = QueuedRecord::new(id, kind, payload, Utc::now());
        records.push(record.clone());
        self.save(kind, &records).await?;

        debug!("queued {} {}", kind, record.id);
        Ok(record)
    }

    pub async fn list_all(&self, kind: RecordKind) -> Result<Vec<QueuedRecord>, AppError> {
        self.load(kind).await
    }

    pub async fn list_unsynced(&self, kind: RecordKind) -> Result<Vec<QueuedRecord>, AppError> {
        Ok(self
            .load(kind)
            .await?
            .into_iter()
            .filter(|r| !r.is_synced())
            .collect())
    }

    pub async fn list_synced(&self, kind: RecordKind) -> Result<Vec<QueuedRecord>, AppError> {
        Ok(self
            .load(kind)
            .await?
            .into_iter()
            .filter(|r| r.is_synced())
            .collect())
    }

    /// Mark one record synced. Unknown or already synced ids are a no-op
    /// and return false.
    pub async fn mark_synced(
        &self,
        kind: RecordKind,
        id: &str,
        remote_id: Option<String>,
    ) -> Result<bool, AppError> {
        let marked = self
            .mark_all_synced(kind, vec![(id.to_string(), remote_id)])
            .await?;
        Ok(marked == 1)
    }

    /// Mark a batch of records synced in a single rewrite. Returns how many
    /// records actually transitioned.
    pub async fn mark_all_synced(
        &self,
        kind: RecordKind,
        ids: Vec<(String, Option<String>)>,
    ) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load(kind).await?;
        let mut wanted: HashMap<String, Option<String>> = ids.into_iter().collect();
        let now = Utc::now();

        let mut marked = 0;
        for record in records.iter_mut() {
            if let Some(remote_id) = wanted.remove(&record.id) {
                if record.mark_synced(now, remote_id) {
                    marked += 1;
                }
            }
        }

        if !wanted.is_empty() {
            debug!("{} {} ids no longer queued, skipped", wanted.len(), kind);
        }
        if marked > 0 {
            self.save(kind, &records).await?;
        }
        Ok(marked)
    }

    /// Drop every record of both kinds and the sync metadata. Irreversible.
    pub async fn clear_all(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        for kind in RecordKind::ALL {
            self.store.remove(kind.storage_key()).await?;
        }
        self.store.remove(SyncMeta::STORAGE_KEY).await?;
        info!("offline queue cleared");
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<usize, AppError> {
        let mut pending = 0;
        for kind in RecordKind::ALL {
            pending += self.list_unsynced(kind).await?.len();
        }
        Ok(pending)
    }

    pub async fn sync_meta(&self) -> Result<SyncMeta, AppError> {
        match self.store.get(SyncMeta::STORAGE_KEY).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(SyncMeta::default()),
        }
    }

    pub async fn record_sync(&self, synced_count: usize) -> Result<(), AppError> {
        let meta = SyncMeta {
            last_sync_at: Some(Utc::now()),
            last_synced_count: synced_count,
        };
        let blob = serde_json::to_string(&meta)?;
        let _guard = self.write_lock.lock().await;
        self.store.set(SyncMeta::STORAGE_KEY, &blob).await
    }

    pub async fn stats(&self) -> Result<QueueStats, AppError> {
        let meta = self.sync_meta().await?;
        Ok(QueueStats {
            registrations: kind_stats(&self.load(RecordKind::Registration).await?),
            screenings: kind_stats(&self.load(RecordKind::Screening).await?),
            last_sync_at: meta.last_sync_at,
            last_synced_count: meta.last_synced_count,
        })
    }
}

fn kind_stats(records: &[QueuedRecord]) -> KindStats {
    let synced = records.iter().filter(|r| r.is_synced()).count();
    KindStats {
        total: records.len(),
        pending: records.len() - synced,
        synced,
    }
}

/// Millisecond timestamp prefix plus a random suffix.
fn generate_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..12])
}
