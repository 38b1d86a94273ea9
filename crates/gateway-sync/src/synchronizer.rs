//! Per-record-kind sync runs: pull remote pages, validate, reconcile
//! conflicts, persist, and optionally push local-only records upward.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, warn};
use tokio::time::sleep;

use gridnode_core::sync::{
    backoff_with_jitter, resolve_earning_conflict, resolve_task_conflict, validate_earning,
    validate_task, ConflictResolution, ConflictStrategy, Earning, ResolutionChoice, SyncConfiguration,
    SyncDetails, SyncResult, SyncRetryClass, SyncRunState, SyncType, Task, ValidationResult,
    CLOCK_SKEW_WARN_SECS, CONSECUTIVE_PAGE_FAILURE_LIMIT, RETRY_BACKOFF_CAP_MS,
};

use crate::client::GatewayApi;
use crate::error::{Result, SyncError};
use crate::local::LocalDataManager;
use crate::types::{FetchParams, FetchResponse, UploadResponse};

/// Record-kind seam binding one record type to its gateway endpoints,
/// local store calls, validation, and conflict resolution.
#[async_trait]
trait RecordKind: Send + Sync {
    type Record: Clone + Send + Sync + 'static;

    fn sync_type(&self) -> SyncType;
    fn record_id(record: &Self::Record) -> String;
    fn updated_at(record: &Self::Record) -> DateTime<Utc>;
    fn content_matches(a: &Self::Record, b: &Self::Record) -> bool;
    fn validate(&self, record: &Self::Record) -> ValidationResult<Self::Record>;
    fn resolve(
        local: &Self::Record,
        remote: &Self::Record,
        strategy: ConflictStrategy,
    ) -> ConflictResolution<Self::Record>;

    async fn fetch_page(
        &self,
        gateway: &dyn GatewayApi,
        params: &FetchParams,
    ) -> Result<FetchResponse<Self::Record>>;

    async fn upload(
        &self,
        gateway: &dyn GatewayApi,
        records: &[Self::Record],
    ) -> Result<UploadResponse>;

    async fn load_local(&self, local: &dyn LocalDataManager) -> Result<Vec<Self::Record>>;

    async fn persist(&self, local: &dyn LocalDataManager, records: Vec<Self::Record>)
        -> Result<()>;
}

struct TaskKind;

#[async_trait]
impl RecordKind for TaskKind {
    type Record = Task;

    fn sync_type(&self) -> SyncType {
        SyncType::Tasks
    }

    fn record_id(record: &Task) -> String {
        record.id.clone()
    }

    fn updated_at(record: &Task) -> DateTime<Utc> {
        record.updated_at
    }

    fn content_matches(a: &Task, b: &Task) -> bool {
        a.content_matches(b)
    }

    fn validate(&self, record: &Task) -> ValidationResult<Task> {
        validate_task(record)
    }

    fn resolve(local: &Task, remote: &Task, strategy: ConflictStrategy) -> ConflictResolution<Task> {
        resolve_task_conflict(local, remote, strategy)
    }

    async fn fetch_page(
        &self,
        gateway: &dyn GatewayApi,
        params: &FetchParams,
    ) -> Result<FetchResponse<Task>> {
        gateway.fetch_tasks(params, None).await
    }

    async fn upload(&self, gateway: &dyn GatewayApi, records: &[Task]) -> Result<UploadResponse> {
        gateway.upload_tasks(records).await
    }

    async fn load_local(&self, local: &dyn LocalDataManager) -> Result<Vec<Task>> {
        local.get_local_tasks(None).await
    }

    async fn persist(&self, local: &dyn LocalDataManager, records: Vec<Task>) -> Result<()> {
        local.save_tasks(records).await
    }
}

/// Earnings carry the set of locally known task identifiers so that
/// dangling task references can be flagged during validation.
struct EarningKind {
    known_task_ids: HashSet<String>,
}

#[async_trait]
impl RecordKind for EarningKind {
    type Record = Earning;

    fn sync_type(&self) -> SyncType {
        SyncType::Earnings
    }

    fn record_id(record: &Earning) -> String {
        record.id.clone()
    }

    fn updated_at(record: &Earning) -> DateTime<Utc> {
        record.updated_at
    }

    fn content_matches(a: &Earning, b: &Earning) -> bool {
        a.content_matches(b)
    }

    fn validate(&self, record: &Earning) -> ValidationResult<Earning> {
        let task_exists = record
            .task_id
            .as_ref()
            .map(|id| self.known_task_ids.contains(id));
        validate_earning(record, task_exists)
    }

    fn resolve(
        local: &Earning,
        remote: &Earning,
        strategy: ConflictStrategy,
    ) -> ConflictResolution<Earning> {
        resolve_earning_conflict(local, remote, strategy)
    }

    async fn fetch_page(
        &self,
        gateway: &dyn GatewayApi,
        params: &FetchParams,
    ) -> Result<FetchResponse<Earning>> {
        gateway.fetch_earnings(params, None).await
    }

    async fn upload(&self, gateway: &dyn GatewayApi, records: &[Earning]) -> Result<UploadResponse> {
        gateway.upload_earnings(records).await
    }

    async fn load_local(&self, local: &dyn LocalDataManager) -> Result<Vec<Earning>> {
        local.get_local_earnings(None).await
    }

    async fn persist(&self, local: &dyn LocalDataManager, records: Vec<Earning>) -> Result<()> {
        local.save_earnings(records).await
    }
}

/// Tracks the run state machine and logs transitions.
struct RunState {
    sync_type: SyncType,
    current: SyncRunState,
}

impl RunState {
    fn new(sync_type: SyncType) -> Self {
        Self {
            sync_type,
            current: SyncRunState::Idle,
        }
    }

    fn advance(&mut self, next: SyncRunState) {
        if self.current == next {
            return;
        }
        if self.current.can_transition_to(next) {
            debug!(
                "[GatewaySync] {} run {:?} -> {:?}",
                self.sync_type.as_str(),
                self.current,
                next
            );
        } else {
            warn!(
                "[GatewaySync] {} run made unexpected transition {:?} -> {:?}",
                self.sync_type.as_str(),
                self.current,
                next
            );
        }
        self.current = next;
    }
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false)
}

/// One sequential sync run for one record kind.
///
/// Fail-fast errors (configuration, unreachable local store at startup)
/// surface as `Err`; everything that happens after the run is underway is
/// folded into the returned [`SyncResult`].
async fn run_sync<K: RecordKind>(
    kind: &K,
    gateway: &dyn GatewayApi,
    local: &dyn LocalDataManager,
    config: &SyncConfiguration,
    forced_since: Option<DateTime<Utc>>,
    cancel: Option<&AtomicBool>,
) -> Result<SyncResult> {
    config.validate().map_err(SyncError::config)?;

    let sync_type = kind.sync_type();
    let started = Instant::now();
    let mut state = RunState::new(sync_type);

    let previous_watermark = local.get_last_sync_time(sync_type).await?;
    let since = match forced_since {
        Some(explicit) => Some(explicit),
        None if config.sync_mode.is_incremental() => previous_watermark,
        None => None,
    };
    debug!(
        "[GatewaySync] {} run starting (mode={:?}, since={:?})",
        sync_type.as_str(),
        config.sync_mode,
        since
    );

    // Captured up front so the watermark reflects gateway time at the
    // start of the sweep, not device wall-clock at the end.
    let server_time = match gateway.get_server_time().await {
        Ok(time) => Some(time),
        Err(err) => {
            warn!(
                "[GatewaySync] {} run could not read server time: {}",
                sync_type.as_str(),
                err
            );
            None
        }
    };

    let local_records = kind.load_local(local).await?;
    let mut local_index: HashMap<String, K::Record> = local_records
        .iter()
        .map(|record| (K::record_id(record), record.clone()))
        .collect();

    let mut details = SyncDetails::default();
    let mut errors = 0usize;
    let mut conflicts = 0usize;
    let mut seen_remote: HashSet<String> = HashSet::new();
    let mut upload_winners: HashMap<String, K::Record> = HashMap::new();

    let mut page = 1u32;
    let mut consecutive_failures = 0u32;
    let mut cancelled = false;
    let mut connectivity_lost = false;

    loop {
        state.advance(SyncRunState::Fetching);
        if is_cancelled(cancel) {
            debug!(
                "[GatewaySync] {} run cancelled before page {}",
                sync_type.as_str(),
                page
            );
            cancelled = true;
            break;
        }

        let params = FetchParams {
            page,
            page_size: config.batch_size,
            last_sync_time: since,
        };

        let fetched = fetch_page_with_retry(kind, gateway, &params, config).await;
        let response = match fetched {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "[GatewaySync] {} page {} failed after retries: {}",
                    sync_type.as_str(),
                    page,
                    err
                );
                errors += config.batch_size;
                consecutive_failures += 1;
                if consecutive_failures >= CONSECUTIVE_PAGE_FAILURE_LIMIT {
                    connectivity_lost = true;
                    break;
                }
                page += 1;
                continue;
            }
        };
        consecutive_failures = 0;

        let fetched_records = response.data.data;
        let has_more = response.data.has_more;
        if fetched_records.is_empty() {
            if has_more {
                warn!(
                    "[GatewaySync] {} page {} was empty but hasMore was set; stopping sweep",
                    sync_type.as_str(),
                    page
                );
            }
            break;
        }

        state.advance(SyncRunState::Reconciling);
        let mut to_persist: Vec<K::Record> = Vec::new();
        let mut pending_created = 0usize;
        let mut pending_updated = 0usize;

        for record in fetched_records {
            let id = K::record_id(&record);
            seen_remote.insert(id.clone());

            let validation = kind.validate(&record);
            for warning in &validation.warnings {
                warn!("[GatewaySync] {} validation: {}", sync_type.as_str(), warning);
            }
            if !validation.is_valid {
                for error in &validation.errors {
                    warn!(
                        "[GatewaySync] {} discarding invalid record: {}",
                        sync_type.as_str(),
                        error
                    );
                }
                errors += 1;
                continue;
            }
            let record = validation.corrected.unwrap_or(record);

            match local_index.get(&id).cloned() {
                None => {
                    pending_created += 1;
                    local_index.insert(id, record.clone());
                    to_persist.push(record);
                }
                Some(existing) if K::content_matches(&existing, &record) => {
                    details.skipped += 1;
                }
                Some(existing) => {
                    let resolution = K::resolve(&existing, &record, config.conflict_strategy);
                    conflicts += 1;
                    debug!(
                        "[GatewaySync] {} conflict on {}: {:?} ({})",
                        sync_type.as_str(),
                        id,
                        resolution.resolution,
                        resolution.reason
                    );
                    match resolution.resolution {
                        ResolutionChoice::Deferred => {}
                        choice => {
                            let Some(resolved) = resolution.resolved else {
                                warn!(
                                    "[GatewaySync] {} resolver returned no data for {}",
                                    sync_type.as_str(),
                                    id
                                );
                                errors += 1;
                                continue;
                            };
                            pending_updated += 1;
                            // Resolutions that kept local or merged content
                            // leave the gateway stale; queue them for push.
                            if choice != ResolutionChoice::Remote {
                                upload_winners.insert(id.clone(), resolved.clone());
                            }
                            local_index.insert(id, resolved.clone());
                            to_persist.push(resolved);
                        }
                    }
                }
            }
        }

        state.advance(SyncRunState::Persisting);
        if !to_persist.is_empty() {
            let batch_len = to_persist.len();
            match kind.persist(local, to_persist).await {
                Ok(()) => {
                    details.created += pending_created;
                    details.updated += pending_updated;
                }
                Err(err) => {
                    warn!(
                        "[GatewaySync] {} failed to persist page {} ({} records): {}",
                        sync_type.as_str(),
                        page,
                        batch_len,
                        err
                    );
                    errors += batch_len;
                }
            }
        }

        if !has_more {
            break;
        }
        page += 1;
    }

    // Upward push: local-only records plus conflict wins. Failures count
    // as errors but never roll back the downward writes.
    if config.push_enabled && !cancelled && !connectivity_lost {
        let mut candidates: Vec<K::Record> = local_records
            .iter()
            .filter(|record| !seen_remote.contains(&K::record_id(record)))
            .filter(|record| match since {
                Some(watermark) => K::updated_at(record) >= watermark,
                None => true,
            })
            .cloned()
            .collect();
        candidates.extend(upload_winners.into_values());

        if !candidates.is_empty() {
            state.advance(SyncRunState::Uploading);
            for chunk in candidates.chunks(config.batch_size) {
                match upload_with_retry(kind, gateway, chunk, config).await {
                    Ok(outcome) => {
                        errors += outcome.failed;
                        for upload_error in &outcome.errors {
                            warn!(
                                "[GatewaySync] {} upload rejected {:?}: {}",
                                sync_type.as_str(),
                                upload_error.record_id,
                                upload_error.message
                            );
                        }
                    }
                    Err(err) => {
                        warn!(
                            "[GatewaySync] {} upload batch of {} failed: {}",
                            sync_type.as_str(),
                            chunk.len(),
                            err
                        );
                        errors += chunk.len();
                    }
                }
            }
        }
    }

    // The watermark advances on every completed run, even a partial one;
    // records dropped this run are healed by the next full resync. A
    // cancelled or connectivity-lost run leaves it untouched.
    if !cancelled && !connectivity_lost {
        let new_watermark = server_time
            .unwrap_or_else(|| Utc::now() - ChronoDuration::seconds(CLOCK_SKEW_WARN_SECS));
        let advances = previous_watermark
            .map(|previous| new_watermark > previous)
            .unwrap_or(true);
        if advances {
            if let Err(err) = local.update_last_sync_time(sync_type, new_watermark).await {
                warn!(
                    "[GatewaySync] {} failed to advance watermark: {}",
                    sync_type.as_str(),
                    err
                );
            }
        }
    }

    let success = !connectivity_lost;
    let final_state = if connectivity_lost {
        SyncRunState::Failed
    } else if cancelled || errors > 0 {
        SyncRunState::PartiallyCompleted
    } else {
        SyncRunState::Completed
    };
    state.advance(final_state);
    state.advance(SyncRunState::Idle);

    if connectivity_lost {
        warn!(
            "[GatewaySync] {} run stopped early: {}",
            sync_type.as_str(),
            SyncError::ConnectivityLost {
                pages: CONSECUTIVE_PAGE_FAILURE_LIMIT
            }
        );
    }

    Ok(SyncResult {
        success,
        sync_type,
        synced: SyncResult::synced_total(&details),
        errors,
        conflicts,
        details,
        duration_ms: started.elapsed().as_millis() as i64,
        timestamp: Utc::now(),
        cancelled,
    })
}

/// Fetch one page, retrying transient failures with capped exponential
/// backoff.
async fn fetch_page_with_retry<K: RecordKind>(
    kind: &K,
    gateway: &dyn GatewayApi,
    params: &FetchParams,
    config: &SyncConfiguration,
) -> Result<FetchResponse<K::Record>> {
    let mut attempt = 0u32;
    loop {
        match kind.fetch_page(gateway, params).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                if err.retry_class() != SyncRetryClass::Retryable || attempt >= config.max_retries {
                    return Err(err);
                }
                let delay = backoff_with_jitter(attempt, config.retry_delay_ms, RETRY_BACKOFF_CAP_MS);
                debug!(
                    "[GatewaySync] {} page {} attempt {} failed ({}); retrying in {:?}",
                    kind.sync_type().as_str(),
                    params.page,
                    attempt + 1,
                    err,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Upload one batch, retrying transient failures with capped exponential
/// backoff. Partial rejection is a successful response, not a retry.
async fn upload_with_retry<K: RecordKind>(
    kind: &K,
    gateway: &dyn GatewayApi,
    records: &[K::Record],
    config: &SyncConfiguration,
) -> Result<UploadResponse> {
    let mut attempt = 0u32;
    loop {
        match kind.upload(gateway, records).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                if err.retry_class() != SyncRetryClass::Retryable || attempt >= config.max_retries {
                    return Err(err);
                }
                let delay = backoff_with_jitter(attempt, config.retry_delay_ms, RETRY_BACKOFF_CAP_MS);
                debug!(
                    "[GatewaySync] {} upload attempt {} failed ({}); retrying in {:?}",
                    kind.sync_type().as_str(),
                    attempt + 1,
                    err,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Orchestrates sync runs for task records.
pub struct TaskSynchronizer {
    gateway: Arc<dyn GatewayApi>,
    local: Arc<dyn LocalDataManager>,
}

impl TaskSynchronizer {
    pub fn new(gateway: Arc<dyn GatewayApi>, local: Arc<dyn LocalDataManager>) -> Self {
        Self { gateway, local }
    }

    /// Run one sync in the configured mode.
    pub async fn sync(
        &self,
        config: &SyncConfiguration,
        cancel: Option<&AtomicBool>,
    ) -> Result<SyncResult> {
        run_sync(
            &TaskKind,
            self.gateway.as_ref(),
            self.local.as_ref(),
            config,
            None,
            cancel,
        )
        .await
    }

    /// Run one incremental sync from an explicit watermark.
    pub async fn sync_incremental(
        &self,
        config: &SyncConfiguration,
        last_sync_time: DateTime<Utc>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SyncResult> {
        run_sync(
            &TaskKind,
            self.gateway.as_ref(),
            self.local.as_ref(),
            config,
            Some(last_sync_time),
            cancel,
        )
        .await
    }
}

/// Orchestrates sync runs for earning records.
pub struct EarningsSynchronizer {
    gateway: Arc<dyn GatewayApi>,
    local: Arc<dyn LocalDataManager>,
}

impl EarningsSynchronizer {
    pub fn new(gateway: Arc<dyn GatewayApi>, local: Arc<dyn LocalDataManager>) -> Self {
        Self { gateway, local }
    }

    async fn kind(&self) -> Result<EarningKind> {
        // Earnings referencing unknown tasks are only warned about, so a
        // point-in-time snapshot of local task IDs is sufficient.
        let tasks = self.local.get_local_tasks(None).await?;
        Ok(EarningKind {
            known_task_ids: tasks.into_iter().map(|task| task.id).collect(),
        })
    }

    /// Run one sync in the configured mode.
    pub async fn sync(
        &self,
        config: &SyncConfiguration,
        cancel: Option<&AtomicBool>,
    ) -> Result<SyncResult> {
        let kind = self.kind().await?;
        run_sync(
            &kind,
            self.gateway.as_ref(),
            self.local.as_ref(),
            config,
            None,
            cancel,
        )
        .await
    }

    /// Run one incremental sync from an explicit watermark.
    pub async fn sync_incremental(
        &self,
        config: &SyncConfiguration,
        last_sync_time: DateTime<Utc>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SyncResult> {
        let kind = self.kind().await?;
        run_sync(
            &kind,
            self.gateway.as_ref(),
            self.local.as_ref(),
            config,
            Some(last_sync_time),
            cancel,
        )
        .await
    }
}
