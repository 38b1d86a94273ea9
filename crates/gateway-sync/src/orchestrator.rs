//! Composition root for the sync engine.
//!
//! Owns the configuration, serializes repeated runs of the same sync
//! type, aggregates statistics across both synchronizers, and exposes
//! health/diagnostics to the UI and CLI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use gridnode_core::sync::{
    classify_clock_skew, ComponentHealth, ConflictStrategy, DiagnosticCheck, DiagnosticStatus,
    HealthStatus, SkewSeverity, SyncConfiguration, SyncDiagnostics, SyncHealthResult, SyncMode,
    SyncResult, SyncStatistics, SyncType, SYNC_INTERVAL_JITTER_SECS,
};

use crate::client::GatewayApi;
use crate::error::{Result, SyncError};
use crate::local::LocalDataManager;
use crate::synchronizer::{EarningsSynchronizer, TaskSynchronizer};

/// Consecutive configuration-error cycles after which the background
/// engine stops instead of spinning.
const BACKGROUND_CONFIG_ERROR_LIMIT: u32 = 5;

/// Composition root ("sync service") constructed once per device process
/// with injected gateway and local-store implementations.
pub struct SyncOrchestrator {
    gateway: Arc<dyn GatewayApi>,
    local: Arc<dyn LocalDataManager>,
    tasks: TaskSynchronizer,
    earnings: EarningsSynchronizer,
    config: RwLock<SyncConfiguration>,
    statistics: Mutex<SyncStatistics>,
    task_run_guard: Mutex<()>,
    earnings_run_guard: Mutex<()>,
    task_cancel: AtomicBool,
    earnings_cancel: AtomicBool,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    /// Create the orchestrator. Fails fast on an invalid configuration.
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        local: Arc<dyn LocalDataManager>,
        config: SyncConfiguration,
    ) -> Result<Self> {
        config.validate().map_err(SyncError::config)?;
        Ok(Self {
            tasks: TaskSynchronizer::new(Arc::clone(&gateway), Arc::clone(&local)),
            earnings: EarningsSynchronizer::new(Arc::clone(&gateway), Arc::clone(&local)),
            gateway,
            local,
            config: RwLock::new(config),
            statistics: Mutex::new(SyncStatistics::default()),
            task_run_guard: Mutex::new(()),
            earnings_run_guard: Mutex::new(()),
            task_cancel: AtomicBool::new(false),
            earnings_cancel: AtomicBool::new(false),
            background: Mutex::new(None),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sync entry points
    // ─────────────────────────────────────────────────────────────────────

    /// Run one task sync in the configured mode.
    pub async fn sync_tasks(&self) -> Result<SyncResult> {
        let config = self.config.read().await.clone();
        self.run_tasks_with(&config, None).await
    }

    /// Run one earnings sync in the configured mode.
    pub async fn sync_earnings(&self) -> Result<SyncResult> {
        let config = self.config.read().await.clone();
        self.run_earnings_with(&config, None).await
    }

    /// Run one incremental task sync from an explicit watermark.
    pub async fn sync_tasks_incremental(&self, last_sync_time: DateTime<Utc>) -> Result<SyncResult> {
        let config = self.config.read().await.clone();
        self.run_tasks_with(&config, Some(last_sync_time)).await
    }

    /// Run one incremental earnings sync from an explicit watermark.
    pub async fn sync_earnings_incremental(
        &self,
        last_sync_time: DateTime<Utc>,
    ) -> Result<SyncResult> {
        let config = self.config.read().await.clone();
        self.run_earnings_with(&config, Some(last_sync_time)).await
    }

    /// Ask the active run of a sync type to stop at the next page
    /// boundary. A cancelled run never advances its watermark.
    pub fn request_cancel(&self, sync_type: SyncType) {
        match sync_type {
            SyncType::Tasks => self.task_cancel.store(true, Ordering::Relaxed),
            SyncType::Earnings => self.earnings_cancel.store(true, Ordering::Relaxed),
        }
    }

    async fn run_tasks_with(
        &self,
        config: &SyncConfiguration,
        forced_since: Option<DateTime<Utc>>,
    ) -> Result<SyncResult> {
        if !config.tasks_enabled {
            return Err(SyncError::config("task sync is disabled"));
        }
        // Serializes repeated task runs; earnings runs proceed
        // independently on their own guard.
        let _guard = self.task_run_guard.lock().await;
        self.task_cancel.store(false, Ordering::Relaxed);
        let result = match forced_since {
            Some(since) => {
                self.tasks
                    .sync_incremental(config, since, Some(&self.task_cancel))
                    .await?
            }
            None => self.tasks.sync(config, Some(&self.task_cancel)).await?,
        };
        self.record_run(&result).await;
        Ok(result)
    }

    async fn run_earnings_with(
        &self,
        config: &SyncConfiguration,
        forced_since: Option<DateTime<Utc>>,
    ) -> Result<SyncResult> {
        if !config.earnings_enabled {
            return Err(SyncError::config("earnings sync is disabled"));
        }
        let _guard = self.earnings_run_guard.lock().await;
        self.earnings_cancel.store(false, Ordering::Relaxed);
        let result = match forced_since {
            Some(since) => {
                self.earnings
                    .sync_incremental(config, since, Some(&self.earnings_cancel))
                    .await?
            }
            None => self.earnings.sync(config, Some(&self.earnings_cancel)).await?,
        };
        self.record_run(&result).await;
        Ok(result)
    }

    async fn record_run(&self, result: &SyncResult) {
        self.statistics.lock().await.record_run(result);
        info!(
            "[GatewaySync] {} run finished success={} synced={} errors={} conflicts={} duration_ms={}",
            result.sync_type.as_str(),
            result.success,
            result.synced,
            result.errors,
            result.conflicts,
            result.duration_ms
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────

    /// Snapshot of the current configuration.
    pub async fn configuration(&self) -> SyncConfiguration {
        self.config.read().await.clone()
    }

    /// Replace the configuration. Runs already in progress keep the
    /// snapshot they started with.
    pub async fn reconfigure(&self, config: SyncConfiguration) -> Result<()> {
        config.validate().map_err(SyncError::config)?;
        *self.config.write().await = config;
        Ok(())
    }

    /// Change only the conflict strategy; takes effect on the next run.
    pub async fn set_conflict_strategy(&self, strategy: ConflictStrategy) {
        self.config.write().await.conflict_strategy = strategy;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statistics, health, diagnostics
    // ─────────────────────────────────────────────────────────────────────

    /// Read-only snapshot of the running counters.
    pub async fn get_sync_statistics(&self) -> SyncStatistics {
        self.statistics.lock().await.clone()
    }

    /// Probe each component independently and aggregate. Does not run a
    /// sync.
    pub async fn check_sync_health(&self) -> SyncHealthResult {
        let mut components = Vec::new();

        match self.gateway.check_connectivity().await {
            Ok(()) => components.push(ComponentHealth {
                component: "gateway".to_string(),
                status: HealthStatus::Healthy,
                message: "gateway reachable".to_string(),
            }),
            Err(err) => components.push(ComponentHealth {
                component: "gateway".to_string(),
                status: HealthStatus::Unhealthy,
                message: format!("connectivity probe failed: {}", err),
            }),
        }

        match self.local.get_last_sync_time(SyncType::Tasks).await {
            Ok(_) => components.push(ComponentHealth {
                component: "local_store".to_string(),
                status: HealthStatus::Healthy,
                message: "local store reachable".to_string(),
            }),
            Err(err) => components.push(ComponentHealth {
                component: "local_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: format!("local store access failed: {}", err),
            }),
        }

        let config = self.config.read().await.clone();
        components.push(match config.validate() {
            Ok(()) if !config.tasks_enabled && !config.earnings_enabled => ComponentHealth {
                component: "configuration".to_string(),
                status: HealthStatus::Degraded,
                message: "both record kinds are disabled".to_string(),
            },
            Ok(()) => ComponentHealth {
                component: "configuration".to_string(),
                status: HealthStatus::Healthy,
                message: "configuration valid".to_string(),
            },
            Err(err) => ComponentHealth {
                component: "configuration".to_string(),
                status: HealthStatus::Unhealthy,
                message: err,
            },
        });

        let status = components
            .iter()
            .map(|component| component.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        SyncHealthResult {
            status,
            components,
            checked_at: Utc::now(),
        }
    }

    /// Run the fixed battery of named diagnostic checks.
    pub async fn perform_sync_diagnostics(&self) -> SyncDiagnostics {
        let mut checks = Vec::new();

        let started = Instant::now();
        let (status, message) = match self.gateway.check_connectivity().await {
            Ok(()) => (DiagnosticStatus::Pass, "gateway responded".to_string()),
            Err(err) => (DiagnosticStatus::Fail, format!("probe failed: {}", err)),
        };
        checks.push(DiagnosticCheck {
            name: "gateway_connectivity".to_string(),
            status,
            duration_ms: started.elapsed().as_millis() as i64,
            message,
        });

        let started = Instant::now();
        let (status, message) = match self.gateway.get_server_time().await {
            Ok(server_time) => {
                let skew_secs = (server_time - Utc::now()).num_seconds();
                let status = match classify_clock_skew(skew_secs) {
                    SkewSeverity::Acceptable => DiagnosticStatus::Pass,
                    SkewSeverity::Elevated => DiagnosticStatus::Warning,
                    SkewSeverity::Excessive => DiagnosticStatus::Fail,
                };
                (status, format!("device/gateway clock skew is {}s", skew_secs))
            }
            Err(err) => (
                DiagnosticStatus::Fail,
                format!("could not read gateway clock: {}", err),
            ),
        };
        checks.push(DiagnosticCheck {
            name: "server_clock_skew".to_string(),
            status,
            duration_ms: started.elapsed().as_millis() as i64,
            message,
        });

        let started = Instant::now();
        let tasks_watermark = self.local.get_last_sync_time(SyncType::Tasks).await;
        let earnings_watermark = self.local.get_last_sync_time(SyncType::Earnings).await;
        let (status, message) = match (&tasks_watermark, &earnings_watermark) {
            (Ok(tasks), Ok(earnings)) => (
                DiagnosticStatus::Pass,
                format!(
                    "local store reachable (tasks watermark {:?}, earnings watermark {:?})",
                    tasks, earnings
                ),
            ),
            (Err(err), _) | (_, Err(err)) => (
                DiagnosticStatus::Fail,
                format!("local store access failed: {}", err),
            ),
        };
        checks.push(DiagnosticCheck {
            name: "local_store".to_string(),
            status,
            duration_ms: started.elapsed().as_millis() as i64,
            message,
        });

        let started = Instant::now();
        let config = self.config.read().await.clone();
        let (status, message) = match config.validate() {
            Ok(()) if !config.tasks_enabled && !config.earnings_enabled => (
                DiagnosticStatus::Warning,
                "configuration valid but both record kinds are disabled".to_string(),
            ),
            Ok(()) => (DiagnosticStatus::Pass, "configuration valid".to_string()),
            Err(err) => (DiagnosticStatus::Fail, err),
        };
        checks.push(DiagnosticCheck {
            name: "configuration".to_string(),
            status,
            duration_ms: started.elapsed().as_millis() as i64,
            message,
        });

        let status = checks
            .iter()
            .map(|check| check.status)
            .max()
            .unwrap_or(DiagnosticStatus::Pass);

        SyncDiagnostics {
            status,
            checks,
            ran_at: Utc::now(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Background engine
    // ─────────────────────────────────────────────────────────────────────

    /// Spawn the periodic sync loop if it is not already running.
    ///
    /// Incremental runs fire on `sync_interval_secs`; a full resync is
    /// forced once `full_resync_interval_secs` has elapsed, healing
    /// records dropped by validation or deferred conflicts.
    pub async fn ensure_background_started(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.background.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
            guard.take();
        }

        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut consecutive_config_errors = 0u32;
            let mut last_full_resync = Instant::now();
            loop {
                let config = orchestrator.config.read().await.clone();
                let mut run_config = config.clone();
                if last_full_resync.elapsed().as_secs() >= config.full_resync_interval_secs {
                    run_config.sync_mode = SyncMode::Full;
                    last_full_resync = Instant::now();
                    info!("[GatewaySync] Periodic full resync due; running in full mode");
                }

                let mut config_error = !run_config.tasks_enabled && !run_config.earnings_enabled;
                if run_config.tasks_enabled {
                    match orchestrator.run_tasks_with(&run_config, None).await {
                        Ok(result) => debug!(
                            "[GatewaySync] Background task cycle success={} synced={}",
                            result.success, result.synced
                        ),
                        Err(err) => {
                            warn!("[GatewaySync] Background task cycle failed: {}", err);
                            config_error |= matches!(err, SyncError::Config(_));
                        }
                    }
                }
                if run_config.earnings_enabled {
                    match orchestrator.run_earnings_with(&run_config, None).await {
                        Ok(result) => debug!(
                            "[GatewaySync] Background earnings cycle success={} synced={}",
                            result.success, result.synced
                        ),
                        Err(err) => {
                            warn!("[GatewaySync] Background earnings cycle failed: {}", err);
                            config_error |= matches!(err, SyncError::Config(_));
                        }
                    }
                }

                if config_error {
                    consecutive_config_errors += 1;
                    if consecutive_config_errors >= BACKGROUND_CONFIG_ERROR_LIMIT {
                        info!(
                            "[GatewaySync] {} consecutive configuration-error cycles. Stopping background engine.",
                            consecutive_config_errors
                        );
                        break;
                    }
                } else {
                    consecutive_config_errors = 0;
                }

                let jitter_bound = SYNC_INTERVAL_JITTER_SECS.saturating_mul(1000).max(1);
                let jitter_ms = Utc::now().timestamp_millis().unsigned_abs() % jitter_bound;
                let delay_ms = config.sync_interval_secs.saturating_mul(1000) + jitter_ms;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        });
        *guard = Some(handle);
        Ok(())
    }

    /// Stop the background loop if it is running.
    pub async fn stop_background(&self) {
        if let Some(handle) = self.background.lock().await.take() {
            handle.abort();
        }
    }
}
