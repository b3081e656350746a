use std::sync::Arc;

use sqlx::SqlitePool;

use crate::connectivity::Connectivity;
use crate::queue::OfflineQueue;
use crate::services::SyncService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub queue: Arc<OfflineQueue>,
    pub sync: Arc<SyncService>,
    pub connectivity: Connectivity,
}
