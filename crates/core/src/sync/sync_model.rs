//! Sync configuration, run results, and health/diagnostic report models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record kinds that carry their own watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Tasks,
    Earnings,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Earnings => "earnings",
        }
    }
}

/// How much of the remote history a run fetches.
///
/// `Delta` behaves like `Incremental` at the fetch boundary and is kept as
/// a distinct variant for configuration compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
    Delta,
}

impl SyncMode {
    pub fn is_incremental(&self) -> bool {
        matches!(self, Self::Incremental | Self::Delta)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            "delta" => Some(Self::Delta),
            _ => None,
        }
    }
}

/// Strategy applied when the same identifier differs locally and remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LocalWins,
    RemoteWins,
    LatestWins,
    Merge,
    Manual,
}

impl ConflictStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "local_wins" => Some(Self::LocalWins),
            "remote_wins" => Some(Self::RemoteWins),
            "latest_wins" => Some(Self::LatestWins),
            "merge" => Some(Self::Merge),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Connection identity for the coordinating gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCredentials {
    pub gateway_address: String,
    pub device_id: String,
    pub auth_key: String,
}

impl GatewayCredentials {
    /// Fail-fast check run before any network call.
    pub fn validate(&self) -> Result<(), String> {
        if self.gateway_address.trim().is_empty() {
            return Err("gateway address is not configured".to_string());
        }
        if self.device_id.trim().is_empty() {
            return Err("device ID is not configured".to_string());
        }
        if self.auth_key.trim().is_empty() {
            return Err("auth key is not configured".to_string());
        }
        Ok(())
    }
}

/// Process-wide sync configuration.
///
/// Loaded once at startup; a run in progress keeps the snapshot taken at
/// its start even if the orchestrator is reconfigured mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfiguration {
    pub sync_interval_secs: u64,
    /// Cadence of the periodic full resync that self-heals records dropped
    /// by validation or deferred conflicts. Expected to be much longer
    /// than `sync_interval_secs`.
    pub full_resync_interval_secs: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub conflict_strategy: ConflictStrategy,
    pub sync_mode: SyncMode,
    pub push_enabled: bool,
    pub tasks_enabled: bool,
    pub earnings_enabled: bool,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            sync_interval_secs: super::SYNC_FOREGROUND_INTERVAL_SECS,
            full_resync_interval_secs: super::FULL_RESYNC_INTERVAL_SECS,
            batch_size: 100,
            max_retries: 3,
            retry_delay_ms: 1_000,
            conflict_strategy: ConflictStrategy::LatestWins,
            sync_mode: SyncMode::Incremental,
            push_enabled: true,
            tasks_enabled: true,
            earnings_enabled: true,
            request_timeout_secs: 30,
        }
    }
}

impl SyncConfiguration {
    /// Fail-fast validation, run before any network call.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch size must be greater than zero".to_string());
        }
        if self.batch_size > 1_000 {
            return Err("batch size exceeds the gateway page limit of 1000".to_string());
        }
        if self.max_retries > 10 {
            return Err("max retries exceeds the supported bound of 10".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request timeout must be greater than zero".to_string());
        }
        if self.sync_interval_secs == 0 {
            return Err("sync interval must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Overlay `GRIDNODE_*` environment variables on top of `self`.
    ///
    /// Unparseable values are logged and ignored rather than failing the
    /// process at startup.
    pub fn overlaid_from_env(mut self) -> Self {
        fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            let raw = std::env::var(key).ok()?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("[GatewaySync] Ignoring unparseable {}={}", key, raw);
                    None
                }
            }
        }

        if let Some(value) = env_parsed("GRIDNODE_SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = value;
        }
        if let Some(value) = env_parsed("GRIDNODE_SYNC_BATCH_SIZE") {
            self.batch_size = value;
        }
        if let Some(value) = env_parsed("GRIDNODE_SYNC_MAX_RETRIES") {
            self.max_retries = value;
        }
        if let Some(value) = env_parsed("GRIDNODE_SYNC_RETRY_DELAY_MS") {
            self.retry_delay_ms = value;
        }
        if let Ok(raw) = std::env::var("GRIDNODE_SYNC_CONFLICT_STRATEGY") {
            match ConflictStrategy::parse(&raw) {
                Some(strategy) => self.conflict_strategy = strategy,
                None => log::warn!(
                    "[GatewaySync] Ignoring unknown GRIDNODE_SYNC_CONFLICT_STRATEGY={}",
                    raw
                ),
            }
        }
        if let Ok(raw) = std::env::var("GRIDNODE_SYNC_MODE") {
            match SyncMode::parse(&raw) {
                Some(mode) => self.sync_mode = mode,
                None => log::warn!("[GatewaySync] Ignoring unknown GRIDNODE_SYNC_MODE={}", raw),
            }
        }
        self
    }
}

/// Per-disposition counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDetails {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Outcome of one sync run for one record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// `false` only when the run stopped early on total connectivity
    /// loss, not merely because some records failed.
    pub success: bool,
    pub sync_type: SyncType,
    pub synced: usize,
    pub errors: usize,
    pub conflicts: usize,
    pub details: SyncDetails,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub cancelled: bool,
}

impl SyncResult {
    /// `synced` is always the sum of the per-disposition counters.
    pub fn synced_total(details: &SyncDetails) -> usize {
        details.created + details.updated + details.skipped
    }
}

/// Run state machine: `Idle` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunState {
    Idle,
    Fetching,
    Reconciling,
    Persisting,
    Uploading,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl SyncRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed | Self::PartiallyCompleted | Self::Failed
        )
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        use SyncRunState::*;
        match self {
            Idle => matches!(next, Fetching),
            // An empty remote sweep can still move straight to the push
            // phase when local-only records are waiting.
            Fetching => matches!(
                next,
                Reconciling | Uploading | Completed | PartiallyCompleted | Failed
            ),
            Reconciling => matches!(next, Persisting | Failed),
            // The page loop returns to Fetching until the gateway reports
            // the final page.
            Persisting => matches!(
                next,
                Fetching | Uploading | Completed | PartiallyCompleted | Failed
            ),
            Uploading => matches!(next, Completed | PartiallyCompleted | Failed),
            Completed | PartiallyCompleted | Failed => matches!(next, Idle),
        }
    }
}

/// Running counters across all runs, both record kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatistics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub total_synced: u64,
    pub total_errors: u64,
    pub conflicts_resolved: u64,
    pub average_duration_ms: f64,
    /// Share of processed records that errored, in `[0, 1]`.
    pub error_rate: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl SyncStatistics {
    /// Fold one finished run into the running counters.
    pub fn record_run(&mut self, result: &SyncResult) {
        let previous_total = self.total_runs as f64;
        self.total_runs += 1;
        if result.success {
            self.successful_runs += 1;
        } else {
            self.failed_runs += 1;
        }
        self.total_synced += result.synced as u64;
        self.total_errors += result.errors as u64;
        self.conflicts_resolved += result.conflicts as u64;
        self.average_duration_ms = (self.average_duration_ms * previous_total
            + result.duration_ms as f64)
            / self.total_runs as f64;
        let processed = self.total_synced + self.total_errors;
        self.error_rate = if processed == 0 {
            0.0
        } else {
            self.total_errors as f64 / processed as f64
        };
        self.last_run_at = Some(result.timestamp);
    }
}

/// Aggregate component health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealthResult {
    /// Worst of the individual components.
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

/// Outcome of one named diagnostic test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: DiagnosticStatus,
    pub duration_ms: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDiagnostics {
    /// Worst of the individual checks.
    pub status: DiagnosticStatus,
    pub checks: Vec<DiagnosticCheck>,
    pub ran_at: DateTime<Utc>,
}
