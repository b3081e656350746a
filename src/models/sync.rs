use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted alongside the queues under [`SyncMeta::STORAGE_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_synced_count: usize,
}

impl SyncMeta {
    pub const STORAGE_KEY: &'static str = "swarnabindu_sync_status";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindStats {
    pub total: usize,
    pub pending: usize,
    pub synced: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub registrations: KindStats,
    pub screenings: KindStats,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_synced_count: usize,
}

impl QueueStats {
    pub fn pending(&self) -> usize {
        self.registrations.pending + self.screenings.pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    pub registrations_pushed: usize,
    pub screenings_pushed: usize,
    pub finished_at: DateTime<Utc>,
}

impl SyncStats {
    pub fn total(&self) -> usize {
        self.registrations_pushed + self.screenings_pushed
    }
}

/// Result of a sync trigger that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced(SyncStats),
    NothingPending,
    /// Another sync was in flight; this trigger was coalesced into it.
    AlreadyRunning,
}
