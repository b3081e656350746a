#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use swarnabindu::connectivity::Connectivity;
use swarnabindu::error::AppError;
use swarnabindu::models::RecordKind;
use swarnabindu::queue::OfflineQueue;
use swarnabindu::remote::{RemoteStore, Row};
use swarnabindu::services::SyncService;
use swarnabindu::storage::MemoryStore;

/// Records every write and echoes rows back with a numeric `id`.
#[derive(Default)]
pub struct MockRemote {
    pub batches: Mutex<Vec<(RecordKind, Vec<Row>)>>,
    pub singles: Mutex<Vec<(RecordKind, Row)>>,
    fail_writes: AtomicBool,
    fail_kind: Mutex<Option<RecordKind>>,
    delay_ms: AtomicU64,
    next_id: AtomicU64,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only the batches of one kind.
    pub fn set_fail_kind(&self, kind: Option<RecordKind>) {
        *self.fail_kind.lock().unwrap() = kind;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn rows_written(&self) -> usize {
        let batched: usize = self.batches.lock().unwrap().iter().map(|(_, rows)| rows.len()).sum();
        batched + self.singles.lock().unwrap().len()
    }

    async fn before_write(&self) -> Result<(), AppError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::RemoteWriteFailed("503 Service Unavailable".to_string()));
        }
        Ok(())
    }

    fn echo(&self, row: &Row) -> Row {
        let mut echoed = row.clone();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        echoed.insert("id".to_string(), json!(id));
        echoed
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn insert_batch(&self, kind: RecordKind, rows: Vec<Row>) -> Result<Vec<Row>, AppError> {
        self.before_write().await?;
        if *self.fail_kind.lock().unwrap() == Some(kind) {
            return Err(AppError::RemoteWriteFailed(format!("{} table rejected the batch", kind)));
        }
        let echoed = rows.iter().map(|r| self.echo(r)).collect();
        self.batches.lock().unwrap().push((kind, rows));
        Ok(echoed)
    }

    async fn insert_one(&self, kind: RecordKind, row: Row) -> Result<Option<Row>, AppError> {
        self.before_write().await?;
        let echoed = self.echo(&row);
        self.singles.lock().unwrap().push((kind, row));
        Ok(Some(echoed))
    }

    async fn count(&self, kind: RecordKind) -> Result<u64, AppError> {
        let batched: usize = self
            .batches
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, rows)| rows.len())
            .sum();
        Ok(batched as u64)
    }

    async fn select_recent(&self, kind: RecordKind, limit: u32) -> Result<Vec<Row>, AppError> {
        let batches = self.batches.lock().unwrap();
        Ok(batches
            .iter()
            .filter(|(k, _)| *k == kind)
            .flat_map(|(_, rows)| rows.iter().cloned())
            .take(limit as usize)
            .collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<OfflineQueue>,
    pub remote: Arc<MockRemote>,
    pub connectivity: Connectivity,
    pub sync: Arc<SyncService>,
}

pub fn harness(online: bool) -> Harness {
    harness_with_timeout(online, Duration::from_secs(5))
}

pub fn harness_with_timeout(online: bool, timeout: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(OfflineQueue::new(store.clone()));
    let remote = Arc::new(MockRemote::new());
    let connectivity = Connectivity::new(online);
    let sync = Arc::new(SyncService::new(
        queue.clone(),
        remote.clone(),
        connectivity.clone(),
        timeout,
    ));
    Harness {
        store,
        queue,
        remote,
        connectivity,
        sync,
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn registration(name: &str) -> Map<String, Value> {
    object(json!({
        "childName": name,
        "gender": "female",
        "fatherName": "Ram Bahadur",
        "fatherOccupation": "Farmer",
        "district": "Kaski",
        "wardNumber": 7,
    }))
}

pub fn screening(patient_id: &str, dose: u32) -> Map<String, Value> {
    object(json!({
        "patientId": patient_id,
        "doseDate": "2025-03-14",
        "doseNumber": dose,
        "weightKg": 12.4,
        "hasFever": false,
    }))
}
