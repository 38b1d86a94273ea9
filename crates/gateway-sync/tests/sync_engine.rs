//! End-to-end sync engine scenarios against in-memory fakes of the
//! gateway and the local store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use gridnode_core::sync::{
    ConflictStrategy, Earning, EarningType, HealthStatus, SyncConfiguration, SyncMode, SyncType,
    Task, TaskSource, TaskStatus,
};
use gridnode_gateway_sync::{
    EarningFilters, FetchParams, FetchResponse, GatewayApi, Page, Result, SyncError,
    SyncOrchestrator, TaskFilters, TaskSynchronizer, UploadResponse,
};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap()
}

fn task(id: &str, status: TaskStatus, updated_offset_secs: i64) -> Task {
    Task {
        id: id.to_string(),
        status,
        model_id: "llama-3-8b".to_string(),
        source: TaskSource::Gateway,
        device_id: "device-7".to_string(),
        created_at: base_time() - Duration::hours(1),
        updated_at: base_time() + Duration::seconds(updated_offset_secs),
        duration_ms: Some(1_500),
        metadata: serde_json::Map::new(),
    }
}

fn earning(id: &str, amount: rust_decimal::Decimal, task_id: Option<&str>) -> Earning {
    Earning {
        id: id.to_string(),
        earning_type: EarningType::TaskReward,
        amount,
        task_id: task_id.map(str::to_string),
        device_id: "device-7".to_string(),
        created_at: base_time() - Duration::minutes(30),
        updated_at: base_time(),
    }
}

fn test_config() -> SyncConfiguration {
    SyncConfiguration {
        batch_size: 25,
        max_retries: 0,
        retry_delay_ms: 1,
        sync_mode: SyncMode::Full,
        push_enabled: false,
        ..SyncConfiguration::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────

/// In-memory gateway with scriptable failures.
#[derive(Default)]
struct FakeGateway {
    remote_tasks: Mutex<Vec<Task>>,
    remote_earnings: Mutex<Vec<Earning>>,
    uploaded_tasks: Mutex<Vec<Task>>,
    uploaded_earnings: Mutex<Vec<Earning>>,
    seen_task_params: Mutex<Vec<FetchParams>>,
    /// Number of upcoming task fetches that fail with a 503.
    failing_task_fetches: AtomicU32,
    fail_uploads: AtomicBool,
    offline: AtomicBool,
    server_time_offset_secs: Mutex<i64>,
    /// Artificial latency per task fetch, to widen overlap windows.
    task_fetch_delay_ms: AtomicU32,
    active_task_fetches: AtomicU32,
    max_active_task_fetches: AtomicU32,
}

impl FakeGateway {
    fn new() -> Self {
        Self::default()
    }

    fn set_remote_tasks(&self, tasks: Vec<Task>) {
        *self.remote_tasks.lock().unwrap() = tasks;
    }

    fn set_remote_earnings(&self, earnings: Vec<Earning>) {
        *self.remote_earnings.lock().unwrap() = earnings;
    }

    fn server_time(&self) -> DateTime<Utc> {
        base_time() + Duration::seconds(*self.server_time_offset_secs.lock().unwrap())
    }

    fn page_of<T: Clone>(records: &[T], params: &FetchParams) -> Page<T> {
        let start = ((params.page.max(1) - 1) as usize) * params.page_size;
        let slice: Vec<T> = records
            .iter()
            .skip(start)
            .take(params.page_size)
            .cloned()
            .collect();
        let has_more = start + slice.len() < records.len();
        Page {
            data: slice,
            total: records.len() as u64,
            page: params.page,
            page_size: params.page_size,
            has_more,
        }
    }

    fn envelope<T>(&self, page: Page<T>) -> FetchResponse<T> {
        FetchResponse {
            success: true,
            data: page,
            server_time: self.server_time(),
            version: "1".to_string(),
        }
    }
}

#[async_trait]
impl GatewayApi for FakeGateway {
    async fn fetch_tasks(
        &self,
        params: &FetchParams,
        _filters: Option<&TaskFilters>,
    ) -> Result<FetchResponse<Task>> {
        let active = self.active_task_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_task_fetches.fetch_max(active, Ordering::SeqCst);
        let delay = self.task_fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay as u64)).await;
        }

        self.seen_task_params.lock().unwrap().push(params.clone());
        if self.failing_task_fetches.load(Ordering::SeqCst) > 0 {
            self.failing_task_fetches.fetch_sub(1, Ordering::SeqCst);
            self.active_task_fetches.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::api(503, "gateway unavailable"));
        }
        let filtered: Vec<Task> = self
            .remote_tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|task| match params.last_sync_time {
                Some(since) => task.updated_at >= since,
                None => true,
            })
            .cloned()
            .collect();
        self.active_task_fetches.fetch_sub(1, Ordering::SeqCst);
        Ok(self.envelope(Self::page_of(&filtered, params)))
    }

    async fn fetch_earnings(
        &self,
        params: &FetchParams,
        _filters: Option<&EarningFilters>,
    ) -> Result<FetchResponse<Earning>> {
        let filtered: Vec<Earning> = self
            .remote_earnings
            .lock()
            .unwrap()
            .iter()
            .filter(|earning| match params.last_sync_time {
                Some(since) => earning.updated_at >= since,
                None => true,
            })
            .cloned()
            .collect();
        Ok(self.envelope(Self::page_of(&filtered, params)))
    }

    async fn upload_tasks(&self, records: &[Task]) -> Result<UploadResponse> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(SyncError::api(500, "upload rejected"));
        }
        self.uploaded_tasks
            .lock()
            .unwrap()
            .extend(records.iter().cloned());
        Ok(UploadResponse {
            success: true,
            uploaded: records.len(),
            failed: 0,
            errors: Vec::new(),
        })
    }

    async fn upload_earnings(&self, records: &[Earning]) -> Result<UploadResponse> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(SyncError::api(500, "upload rejected"));
        }
        self.uploaded_earnings
            .lock()
            .unwrap()
            .extend(records.iter().cloned());
        Ok(UploadResponse {
            success: true,
            uploaded: records.len(),
            failed: 0,
            errors: Vec::new(),
        })
    }

    async fn check_connectivity(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::api(503, "probe failed"));
        }
        Ok(())
    }

    async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::api(503, "probe failed"));
        }
        Ok(self.server_time())
    }
}

/// In-memory local store keyed by record identifier.
#[derive(Default)]
struct MemoryStore {
    tasks: Mutex<HashMap<String, Task>>,
    earnings: Mutex<HashMap<String, Earning>>,
    watermarks: Mutex<HashMap<SyncType, DateTime<Utc>>>,
}

impl MemoryStore {
    fn new() -> Self {
        Self::default()
    }

    fn seed_tasks(&self, tasks: Vec<Task>) {
        let mut map = self.tasks.lock().unwrap();
        for task in tasks {
            map.insert(task.id.clone(), task);
        }
    }

    fn task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    fn earning_count(&self) -> usize {
        self.earnings.lock().unwrap().len()
    }

    fn watermark(&self, sync_type: SyncType) -> Option<DateTime<Utc>> {
        self.watermarks.lock().unwrap().get(&sync_type).copied()
    }

    fn set_watermark(&self, sync_type: SyncType, time: DateTime<Utc>) {
        self.watermarks.lock().unwrap().insert(sync_type, time);
    }
}

#[async_trait]
impl gridnode_gateway_sync::LocalDataManager for MemoryStore {
    async fn save_tasks(&self, records: Vec<Task>) -> Result<()> {
        let mut map = self.tasks.lock().unwrap();
        for record in records {
            map.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn save_earnings(&self, records: Vec<Earning>) -> Result<()> {
        let mut map = self.earnings.lock().unwrap();
        for record in records {
            map.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn get_local_tasks(&self, _filters: Option<&TaskFilters>) -> Result<Vec<Task>> {
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }

    async fn get_local_earnings(&self, _filters: Option<&EarningFilters>) -> Result<Vec<Earning>> {
        Ok(self.earnings.lock().unwrap().values().cloned().collect())
    }

    async fn get_last_sync_time(&self, sync_type: SyncType) -> Result<Option<DateTime<Utc>>> {
        Ok(self.watermarks.lock().unwrap().get(&sync_type).copied())
    }

    async fn update_last_sync_time(&self, sync_type: SyncType, time: DateTime<Utc>) -> Result<()> {
        self.watermarks.lock().unwrap().insert(sync_type, time);
        Ok(())
    }
}

fn orchestrator(
    gateway: &Arc<FakeGateway>,
    store: &Arc<MemoryStore>,
    config: SyncConfiguration,
) -> Arc<SyncOrchestrator> {
    let gateway: Arc<dyn GatewayApi> = Arc::clone(gateway) as Arc<dyn GatewayApi>;
    let store: Arc<dyn gridnode_gateway_sync::LocalDataManager> =
        Arc::clone(store) as Arc<dyn gridnode_gateway_sync::LocalDataManager>;
    Arc::new(SyncOrchestrator::new(gateway, store, config).expect("build orchestrator"))
}

// ─────────────────────────────────────────────────────────────────────────
// End-to-end scenarios
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_local_and_remote_record_is_skipped() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let t1 = task("t1", TaskStatus::Completed, 0);
    store.seed_tasks(vec![t1.clone()]);
    gateway.set_remote_tasks(vec![t1]);

    let sync = orchestrator(&gateway, &store, test_config());
    let result = sync.sync_tasks().await.expect("run");

    assert!(result.success);
    assert_eq!(result.details.skipped, 1);
    assert_eq!(result.details.updated, 0);
    assert_eq!(result.conflicts, 0);
    assert_eq!(result.synced, 1);
}

#[tokio::test]
async fn latest_wins_applies_newer_remote_status() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    store.seed_tasks(vec![task("t1", TaskStatus::Running, 0)]);
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 60)]);

    let config = SyncConfiguration {
        conflict_strategy: ConflictStrategy::LatestWins,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert_eq!(result.details.updated, 1);
    assert_eq!(result.conflicts, 1);
    let resolved = store.task("t1").expect("resolved task");
    assert_eq!(resolved.status, TaskStatus::Completed);
}

#[tokio::test]
async fn three_consecutive_page_failures_stop_the_run() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    gateway.failing_task_fetches.store(3, Ordering::SeqCst);
    gateway.offline.store(true, Ordering::SeqCst);

    let config = test_config();
    let batch_size = config.batch_size;
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert!(!result.success);
    assert_eq!(result.errors, batch_size * 3);
    assert_eq!(result.synced, 0);
    assert_eq!(store.watermark(SyncType::Tasks), None);

    let health = sync.check_sync_health().await;
    assert_eq!(health.status, HealthStatus::Unhealthy);
    let gateway_component = health
        .components
        .iter()
        .find(|component| component.component == "gateway")
        .expect("gateway component");
    assert_eq!(gateway_component.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn negative_earning_amount_is_discarded() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_earnings(vec![earning("e1", dec!(-5), None)]);

    let sync = orchestrator(&gateway, &store, test_config());
    let result = sync.sync_earnings().await.expect("run");

    assert!(result.success);
    assert_eq!(result.errors, 1);
    assert_eq!(result.synced, 0);
    assert_eq!(store.earning_count(), 0);
}

#[tokio::test]
async fn earning_with_dangling_task_reference_is_accepted() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_earnings(vec![earning("e1", dec!(0.75), Some("task-not-synced-yet"))]);

    let sync = orchestrator(&gateway, &store, test_config());
    let result = sync.sync_earnings().await.expect("run");

    assert_eq!(result.errors, 0);
    assert_eq!(result.details.created, 1);
    assert_eq!(store.earning_count(), 1);
}

#[tokio::test]
async fn second_run_with_no_remote_changes_is_idempotent() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![
        task("t1", TaskStatus::Completed, 0),
        task("t2", TaskStatus::Failed, 10),
    ]);

    let sync = orchestrator(&gateway, &store, test_config());
    let first = sync.sync_tasks().await.expect("first run");
    assert_eq!(first.details.created, 2);
    let first_watermark = store.watermark(SyncType::Tasks).expect("watermark set");
    assert_eq!(first_watermark, gateway.server_time());

    *gateway.server_time_offset_secs.lock().unwrap() = 300;
    let second = sync.sync_tasks().await.expect("second run");
    assert_eq!(second.details.created, 0);
    assert_eq!(second.details.updated, 0);
    assert_eq!(second.details.skipped, 2);

    let second_watermark = store.watermark(SyncType::Tasks).expect("watermark kept");
    assert!(second_watermark >= first_watermark);
}

#[tokio::test]
async fn cancelled_run_leaves_watermark_unchanged() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    store.set_watermark(SyncType::Tasks, base_time() - Duration::hours(2));

    let synchronizer = TaskSynchronizer::new(
        Arc::clone(&gateway) as Arc<dyn GatewayApi>,
        Arc::clone(&store) as Arc<dyn gridnode_gateway_sync::LocalDataManager>,
    );
    let cancel = AtomicBool::new(true);
    let result = synchronizer
        .sync(&test_config(), Some(&cancel))
        .await
        .expect("run");

    assert!(result.cancelled);
    assert!(result.success);
    assert_eq!(result.synced, 0);
    assert_eq!(
        store.watermark(SyncType::Tasks),
        Some(base_time() - Duration::hours(2))
    );
}

#[tokio::test]
async fn manual_strategy_records_conflict_without_writing() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    store.seed_tasks(vec![task("t1", TaskStatus::Running, 0)]);
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 60)]);

    let config = SyncConfiguration {
        conflict_strategy: ConflictStrategy::Manual,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert_eq!(result.conflicts, 1);
    assert_eq!(result.details.updated, 0);
    let untouched = store.task("t1").expect("local task");
    assert_eq!(untouched.status, TaskStatus::Running);
}

#[tokio::test]
async fn push_uploads_local_only_records() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let mut local_only = task("local-1", TaskStatus::Completed, 30);
    local_only.source = TaskSource::Local;
    store.seed_tasks(vec![local_only.clone()]);
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);

    let config = SyncConfiguration {
        push_enabled: true,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert!(result.success);
    assert_eq!(result.errors, 0);
    let uploaded = gateway.uploaded_tasks.lock().unwrap().clone();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].id, "local-1");
}

#[tokio::test]
async fn upload_failure_counts_errors_but_keeps_downward_writes() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let mut local_only = task("local-1", TaskStatus::Completed, 30);
    local_only.source = TaskSource::Local;
    store.seed_tasks(vec![local_only]);
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    gateway.fail_uploads.store(true, Ordering::SeqCst);

    let config = SyncConfiguration {
        push_enabled: true,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert!(result.success);
    assert_eq!(result.errors, 1);
    assert_eq!(result.details.created, 1);
    assert!(store.task("t1").is_some());
}

#[tokio::test]
async fn incremental_run_fetches_from_stored_watermark() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let watermark = base_time() - Duration::hours(1);
    store.set_watermark(SyncType::Tasks, watermark);
    gateway.set_remote_tasks(vec![
        task("old", TaskStatus::Completed, -7_200),
        task("fresh", TaskStatus::Completed, 0),
    ]);

    let config = SyncConfiguration {
        sync_mode: SyncMode::Incremental,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert_eq!(result.details.created, 1);
    assert!(store.task("fresh").is_some());
    assert!(store.task("old").is_none());

    let params = gateway.seen_task_params.lock().unwrap().clone();
    assert_eq!(params[0].last_sync_time, Some(watermark));
}

#[tokio::test]
async fn accounting_holds_across_mixed_dispositions() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    store.seed_tasks(vec![
        task("same", TaskStatus::Completed, 0),
        task("conflicted", TaskStatus::Running, 0),
    ]);
    let mut invalid = task("bad", TaskStatus::Pending, 0);
    invalid.created_at = invalid.updated_at + Duration::hours(1);
    gateway.set_remote_tasks(vec![
        task("same", TaskStatus::Completed, 0),
        task("conflicted", TaskStatus::Completed, 60),
        task("new", TaskStatus::Pending, 10),
        invalid,
    ]);

    let sync = orchestrator(&gateway, &store, test_config());
    let result = sync.sync_tasks().await.expect("run");

    assert_eq!(result.details.created, 1);
    assert_eq!(result.details.updated, 1);
    assert_eq!(result.details.skipped, 1);
    assert_eq!(result.errors, 1);
    assert_eq!(
        result.synced,
        result.details.created + result.details.updated + result.details.skipped
    );
    assert!(result.synced + result.errors <= 4);
}

#[tokio::test]
async fn pagination_walks_every_page() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let remote: Vec<Task> = (0..12)
        .map(|i| task(&format!("t{}", i), TaskStatus::Completed, i))
        .collect();
    gateway.set_remote_tasks(remote);

    let config = SyncConfiguration {
        batch_size: 5,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);
    let result = sync.sync_tasks().await.expect("run");

    assert_eq!(result.details.created, 12);
    let params = gateway.seen_task_params.lock().unwrap().clone();
    assert_eq!(params.len(), 3);
    assert_eq!(params[2].page, 3);
}

#[tokio::test]
async fn repeated_same_type_runs_serialize_and_both_complete() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    // Slow fetches widen the window in which unguarded runs would overlap.
    gateway.task_fetch_delay_ms.store(50, Ordering::SeqCst);

    let sync = orchestrator(&gateway, &store, test_config());
    let first = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.sync_tasks().await })
    };
    let second = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.sync_tasks().await })
    };

    first.await.expect("join").expect("first run");
    second.await.expect("join").expect("second run");

    assert_eq!(gateway.max_active_task_fetches.load(Ordering::SeqCst), 1);
    let stats = sync.get_sync_statistics().await;
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.successful_runs, 2);
}

#[tokio::test]
async fn explicit_incremental_call_overrides_configured_mode() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![
        task("old", TaskStatus::Completed, -7_200),
        task("fresh", TaskStatus::Completed, 0),
    ]);

    // Configured mode is full; the explicit call still fetches from the
    // given watermark.
    let sync = orchestrator(&gateway, &store, test_config());
    let since = base_time() - Duration::hours(1);
    let result = sync.sync_tasks_incremental(since).await.expect("run");

    assert_eq!(result.details.created, 1);
    assert!(store.task("fresh").is_some());
    assert!(store.task("old").is_none());

    let params = gateway.seen_task_params.lock().unwrap().clone();
    assert_eq!(params[0].last_sync_time, Some(since));
}

#[tokio::test]
async fn background_loop_runs_an_immediate_cycle() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    gateway.set_remote_earnings(vec![earning("e1", dec!(1.25), Some("t1"))]);

    let sync = orchestrator(&gateway, &store, test_config());
    sync.ensure_background_started().await.expect("start");
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let stats = sync.get_sync_statistics().await;
    assert!(stats.total_runs >= 2);
    assert!(store.task("t1").is_some());
    assert_eq!(store.earning_count(), 1);

    sync.stop_background().await;
}

#[tokio::test]
async fn task_and_earnings_runs_may_interleave() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    gateway.set_remote_earnings(vec![earning("e1", dec!(1.25), Some("t1"))]);

    let sync = orchestrator(&gateway, &store, test_config());
    let (tasks, earnings) = tokio::join!(sync.sync_tasks(), sync.sync_earnings());

    assert!(tasks.expect("tasks run").success);
    assert!(earnings.expect("earnings run").success);
    assert!(store.watermark(SyncType::Tasks).is_some());
    assert!(store.watermark(SyncType::Earnings).is_some());
}

#[tokio::test]
async fn disabled_record_kind_fails_fast() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let config = SyncConfiguration {
        tasks_enabled: false,
        ..test_config()
    };
    let sync = orchestrator(&gateway, &store, config);

    let err = sync.sync_tasks().await.expect_err("config error");
    assert_eq!(err.code(), "config");
    assert!(gateway.seen_task_params.lock().unwrap().is_empty());
}

#[tokio::test]
async fn statistics_track_runs_and_error_rate() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);
    gateway.set_remote_earnings(vec![earning("e1", dec!(-1), None)]);

    let sync = orchestrator(&gateway, &store, test_config());
    sync.sync_tasks().await.expect("tasks run");
    sync.sync_earnings().await.expect("earnings run");

    let stats = sync.get_sync_statistics().await;
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.total_synced, 1);
    assert_eq!(stats.total_errors, 1);
    assert!(stats.error_rate > 0.0);
    assert!(stats.last_run_at.is_some());
}

#[tokio::test]
async fn diagnostics_pass_against_healthy_fakes() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    // The fake gateway clock is pinned to the scenario base time; any
    // skew against the real clock is exactly what the check measures, so
    // pin it close to now instead.
    let now_offset = (Utc::now() - base_time()).num_seconds();
    *gateway.server_time_offset_secs.lock().unwrap() = now_offset;

    let sync = orchestrator(&gateway, &store, test_config());
    let diagnostics = sync.perform_sync_diagnostics().await;

    assert_eq!(
        diagnostics.status,
        gridnode_core::sync::DiagnosticStatus::Pass
    );
    let names: Vec<&str> = diagnostics
        .checks
        .iter()
        .map(|check| check.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "gateway_connectivity",
            "server_clock_skew",
            "local_store",
            "configuration"
        ]
    );
}

#[tokio::test]
async fn diagnostics_flag_elevated_clock_skew() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    let now_offset = (Utc::now() - base_time()).num_seconds();
    *gateway.server_time_offset_secs.lock().unwrap() = now_offset + 120;

    let sync = orchestrator(&gateway, &store, test_config());
    let diagnostics = sync.perform_sync_diagnostics().await;

    let skew_check = diagnostics
        .checks
        .iter()
        .find(|check| check.name == "server_clock_skew")
        .expect("skew check");
    assert_eq!(
        skew_check.status,
        gridnode_core::sync::DiagnosticStatus::Warning
    );
    assert_eq!(
        diagnostics.status,
        gridnode_core::sync::DiagnosticStatus::Warning
    );
}

#[tokio::test]
async fn strategy_change_applies_on_next_run() {
    let gateway = Arc::new(FakeGateway::new());
    let store = Arc::new(MemoryStore::new());
    store.seed_tasks(vec![task("t1", TaskStatus::Running, 100)]);
    gateway.set_remote_tasks(vec![task("t1", TaskStatus::Completed, 0)]);

    let sync = orchestrator(&gateway, &store, test_config());

    // Latest-wins keeps the newer local copy.
    let first = sync.sync_tasks().await.expect("first run");
    assert_eq!(first.conflicts, 1);
    assert_eq!(
        store.task("t1").expect("task").status,
        TaskStatus::Running
    );

    sync.set_conflict_strategy(ConflictStrategy::RemoteWins).await;
    let second = sync.sync_tasks().await.expect("second run");
    assert_eq!(second.conflicts, 1);
    assert_eq!(
        store.task("t1").expect("task").status,
        TaskStatus::Completed
    );
}
