pub mod record;
pub mod sync;

pub use record::{QueuedRecord, RecordKind, StatusFilter, SyncStatus, REMOTE_ID_FIELD};
pub use sync::{KindStats, QueueStats, SyncMeta, SyncOutcome, SyncStats};
