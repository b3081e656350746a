//! String-keyed blob storage backing the offline queue.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::AppError;

pub use memory::MemoryStore;
pub use sqlite::SqliteKvStore;

/// Persistence medium for the offline queue.
///
/// Implementations report any access failure as
/// [`AppError::StorageUnavailable`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}
