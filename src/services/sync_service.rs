use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::connectivity::Connectivity;
use crate::error::AppError;
use crate::mapping::FieldMapping;
use crate::models::{QueuedRecord, RecordKind, SyncOutcome, SyncStats};
use crate::queue::OfflineQueue;
use crate::remote::{RemoteStore, Row};

/// Drains the offline queue into the remote store.
///
/// At most one batch sync runs at a time. A trigger that arrives meanwhile
/// returns `AlreadyRunning` and makes the running sync go round once more.
/// Immediate writes run beside batches; a record is only ever sent by
/// whichever of the two claimed it first.
pub struct SyncService {
    queue: Arc<OfflineQueue>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Connectivity,
    registrations: FieldMapping,
    screenings: FieldMapping,
    timeout: Duration,
    in_flight: Mutex<()>,
    rerun: AtomicBool,
    claims: Claims,
}

impl SyncService {
    pub fn new(
        queue: Arc<OfflineQueue>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            remote,
            connectivity,
            registrations: FieldMapping::registrations(),
            screenings: FieldMapping::screenings(),
            timeout,
            in_flight: Mutex::new(()),
            rerun: AtomicBool::new(false),
            claims: Claims::default(),
        }
    }

    pub fn with_mappings(mut self, registrations: FieldMapping, screenings: FieldMapping) -> Self {
        self.registrations = registrations;
        self.screenings = screenings;
        self
    }

    pub fn mapping(&self, kind: RecordKind) -> &FieldMapping {
        match kind {
            RecordKind::Registration => &self.registrations,
            RecordKind::Screening => &self.screenings,
        }
    }

    /// True while a batch sync holds the single-flight guard. Immediate
    /// writes do not count.
    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub async fn sync_all(&self) -> Result<SyncOutcome, AppError> {
        let mut guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.rerun.store(true, Ordering::SeqCst);
                // the holder may have let go between the two attempts
                match self.in_flight.try_lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        info!("Sync already in progress, follow-up run requested");
                        return Ok(SyncOutcome::AlreadyRunning);
                    }
                }
            }
        };

        let mut total: Option<SyncStats> = None;
        let mut first = true;
        loop {
            self.rerun.store(false, Ordering::SeqCst);
            let result = self.run_once().await;
            drop(guard);

            match result {
                Ok(SyncOutcome::Synced(stats)) => {
                    total = Some(match total {
                        Some(prev) => SyncStats {
                            registrations_pushed: prev.registrations_pushed + stats.registrations_pushed,
                            screenings_pushed: prev.screenings_pushed + stats.screenings_pushed,
                            finished_at: stats.finished_at,
                        },
                        None => stats,
                    });
                }
                Ok(_) => {}
                Err(e) if first => return Err(e),
                Err(e) => {
                    warn!("Follow-up sync failed: {:?}", e);
                    break;
                }
            }
            first = false;

            if !self.rerun.swap(false, Ordering::SeqCst) {
                break;
            }
            guard = match self.in_flight.try_lock() {
                Ok(guard) => guard,
                // whoever holds it now runs the follow-up
                Err(_) => break,
            };
            info!("Running follow-up sync for triggers received during the last run");
        }

        Ok(match total {
            Some(stats) => SyncOutcome::Synced(stats),
            None => SyncOutcome::NothingPending,
        })
    }

    async fn run_once(&self) -> Result<SyncOutcome, AppError> {
        if !self.connectivity.is_online() {
            return Err(AppError::Offline);
        }

        let (registrations, _registrations_claim) = self
            .claims
            .claim(self.queue.list_unsynced(RecordKind::Registration).await?);
        let (screenings, _screenings_claim) = self
            .claims
            .claim(self.queue.list_unsynced(RecordKind::Screening).await?);

        if registrations.is_empty() && screenings.is_empty() {
            info!("Nothing to sync");
            return Ok(SyncOutcome::NothingPending);
        }

        info!(
            "Starting sync: {} registrations, {} screenings pending",
            registrations.len(),
            screenings.len()
        );

        // Registrations first so screenings never reach the remote before
        // the registration they refer to.
        let registrations_pushed = self.push_batch(RecordKind::Registration, registrations).await?;
        let screenings_pushed = match self.push_batch(RecordKind::Screening, screenings).await {
            Ok(pushed) => pushed,
            Err(e) => {
                if registrations_pushed > 0 {
                    self.queue.record_sync(registrations_pushed).await?;
                }
                return Err(e);
            }
        };

        let stats = SyncStats {
            registrations_pushed,
            screenings_pushed,
            finished_at: Utc::now(),
        };
        self.queue.record_sync(stats.total()).await?;

        info!("Sync completed successfully: {:?}", stats);
        Ok(SyncOutcome::Synced(stats))
    }

    /// Send one kind's snapshot as a single batch. Either every record of the
    /// snapshot is marked synced or none is.
    async fn push_batch(&self, kind: RecordKind, snapshot: Vec<QueuedRecord>) -> Result<usize, AppError> {
        if snapshot.is_empty() {
            return Ok(0);
        }

        let mapping = self.mapping(kind);
        let rows = snapshot
            .iter()
            .map(|r| mapping.to_remote(&r.payload))
            .collect::<Result<Vec<Row>, AppError>>()?;

        let inserted = match tokio::time::timeout(self.timeout, self.remote.insert_batch(kind, rows)).await {
            Ok(Ok(inserted)) => inserted,
            Ok(Err(e)) => {
                warn!("Batch write of {} {} records failed: {}", snapshot.len(), kind, e);
                return Err(into_write_failure(e));
            }
            Err(_) => {
                warn!("Batch write of {} {} records timed out", snapshot.len(), kind);
                return Err(AppError::RemoteWriteFailed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let mut remote_ids = inserted.iter().map(|row| mapping.remote_id_of(row));
        let ids = snapshot
            .iter()
            .map(|r| (r.id.clone(), remote_ids.next().flatten()))
            .collect();

        let marked = self.queue.mark_all_synced(kind, ids).await?;
        info!("Pushed {} {} records", marked, kind);
        Ok(snapshot.len())
    }

    /// Queue a form submission and, when online, try to write it through
    /// immediately. The submission succeeds as long as the record is queued;
    /// a failed immediate write leaves it pending for the next sync.
    pub async fn submit(&self, kind: RecordKind, payload: Map<String, Value>) -> Result<QueuedRecord, AppError> {
        let record = self.queue.append(kind, payload).await?;

        if !self.connectivity.is_online() {
            return Ok(record);
        }
        // a batch that already picked this record up will send it
        let Some(_claim) = self.claims.claim_one(kind, &record.id) else {
            return Ok(record);
        };

        let row = match self.mapping(kind).to_remote(&record.payload) {
            Ok(row) => row,
            Err(e) => {
                warn!("{} {} not sent: {}", kind, record.id, e);
                return Ok(record);
            }
        };

        let inserted = match tokio::time::timeout(self.timeout, self.remote.insert_one(kind, row)).await {
            Ok(Ok(inserted)) => inserted,
            Ok(Err(e)) => {
                warn!("Immediate write of {} {} failed, left queued: {}", kind, record.id, e);
                return Ok(record);
            }
            Err(_) => {
                warn!("Immediate write of {} {} timed out, left queued", kind, record.id);
                return Ok(record);
            }
        };

        let remote_id = inserted.as_ref().and_then(|row| self.mapping(kind).remote_id_of(row));
        self.queue.mark_synced(kind, &record.id, remote_id).await?;

        Ok(self
            .queue
            .list_all(kind)
            .await?
            .into_iter()
            .find(|r| r.id == record.id)
            .unwrap_or(record))
    }

    /// Remote total and most recent rows, translated to local field names.
    pub async fn remote_summary(&self, kind: RecordKind, limit: u32) -> Result<(u64, Vec<Row>), AppError> {
        if !self.connectivity.is_online() {
            return Err(AppError::Offline);
        }
        let total = self.remote.count(kind).await?;
        let mapping = self.mapping(kind);
        let recent = self
            .remote
            .select_recent(kind, limit)
            .await?
            .iter()
            .map(|row| mapping.to_local(row))
            .collect();
        Ok((total, recent))
    }
}

type ClaimKey = (RecordKind, String);

/// Record ids currently being sent, by a batch or an immediate write.
#[derive(Default)]
struct Claims {
    held: std::sync::Mutex<HashSet<ClaimKey>>,
}

impl Claims {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ClaimKey>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keep the records nobody else is sending and claim them until the
    /// returned guard is dropped.
    fn claim(&self, records: Vec<QueuedRecord>) -> (Vec<QueuedRecord>, Claim<'_>) {
        let mut held = self.lock();
        let mut keys = Vec::new();
        let records = records
            .into_iter()
            .filter(|r| {
                let key = (r.kind, r.id.clone());
                if held.insert(key.clone()) {
                    keys.push(key);
                    true
                } else {
                    false
                }
            })
            .collect();
        (records, Claim { claims: self, keys })
    }

    fn claim_one(&self, kind: RecordKind, id: &str) -> Option<Claim<'_>> {
        let key = (kind, id.to_string());
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(Claim { claims: self, keys: vec![key] })
    }
}

struct Claim<'a> {
    claims: &'a Claims,
    keys: Vec<ClaimKey>,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut held = self.claims.lock();
        for key in &self.keys {
            held.remove(key);
        }
    }
}

fn into_write_failure(e: AppError) -> AppError {
    match e {
        AppError::RemoteWriteFailed(_) => e,
        other => AppError::RemoteWriteFailed(other.to_string()),
    }
}
