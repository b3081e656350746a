use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload field under which the remote-assigned id is stashed once known.
pub const REMOTE_ID_FIELD: &str = "remoteId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Registration,
    Screening,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Registration, RecordKind::Screening];

    /// Key of the persisted list for this kind.
    pub fn storage_key(self) -> &'static str {
        match self {
            RecordKind::Registration => "swarnabindu_registrations",
            RecordKind::Screening => "swarnabindu_screenings",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Registration => f.write_str("registration"),
            RecordKind::Screening => f.write_str("screening"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" | "registrations" => Ok(RecordKind::Registration),
            "screening" | "screenings" => Ok(RecordKind::Screening),
            other => Err(format!("unknown record kind: {}", other)),
        }
    }
}

/// Whether a record has left the device.
///
/// The only transition is `Pending -> Synced`; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRecord {
    pub id: String,
    pub kind: RecordKind,
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub status: SyncStatus,
}

impl QueuedRecord {
    pub fn new(id: String, kind: RecordKind, payload: Map<String, Value>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            payload,
            created_at: now,
            status: SyncStatus::Pending,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.status, SyncStatus::Synced { .. })
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SyncStatus::Synced { at } => Some(at),
            SyncStatus::Pending => None,
        }
    }

    /// Flip to synced. Returns false (and changes nothing) if already synced.
    pub fn mark_synced(&mut self, at: DateTime<Utc>, remote_id: Option<String>) -> bool {
        if self.is_synced() {
            return false;
        }
        self.status = SyncStatus::Synced { at };
        if let Some(remote_id) = remote_id {
            self.payload
                .insert(REMOTE_ID_FIELD.to_string(), Value::String(remote_id));
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Synced,
}
