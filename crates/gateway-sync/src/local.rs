//! Boundary to the device-local store.
//!
//! The sync engine never issues raw queries; everything it needs from
//! persistent storage goes through this trait. Writes are upserts keyed
//! by record identifier, so re-applying a batch after a crash is safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gridnode_core::sync::{Earning, SyncType, Task};

use crate::error::Result;
use crate::types::{EarningFilters, TaskFilters};

/// Local persistence boundary consumed by the synchronizers.
///
/// The store exclusively owns persisted rows and the per-sync-type
/// watermark; the engine treats the watermark as opaque except for
/// comparison and advancement.
#[async_trait]
pub trait LocalDataManager: Send + Sync {
    /// Upsert a batch of tasks keyed by identifier.
    async fn save_tasks(&self, records: Vec<Task>) -> Result<()>;

    /// Upsert a batch of earnings keyed by identifier.
    async fn save_earnings(&self, records: Vec<Earning>) -> Result<()>;

    async fn get_local_tasks(&self, filters: Option<&TaskFilters>) -> Result<Vec<Task>>;

    async fn get_local_earnings(&self, filters: Option<&EarningFilters>) -> Result<Vec<Earning>>;

    /// Last successfully synchronized point in time for a sync type, if
    /// any run has completed before.
    async fn get_last_sync_time(&self, sync_type: SyncType) -> Result<Option<DateTime<Utc>>>;

    /// Advance the watermark. Called only after a run completes (fully or
    /// partially) successfully; never rolled back.
    async fn update_last_sync_time(&self, sync_type: SyncType, time: DateTime<Utc>) -> Result<()>;
}
