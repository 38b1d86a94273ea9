//! Task domain model for gateway-assigned and locally created compute work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a compute task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never transition back to `Pending`/`Running`
    /// outside of explicit conflict resolution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Monotonic position along the task lifecycle, used by merge
    /// resolution to keep the more advanced status.
    pub fn lifecycle_rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 2,
            Self::Cancelled => 2,
        }
    }
}

/// Where a task originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Local,
    Gateway,
}

/// One unit of inference/compute work executed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable, globally unique, immutable once assigned.
    pub id: String,
    pub status: TaskStatus,
    pub model_id: String,
    pub source: TaskSource,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Free-form execution metadata (token counts, sampler settings, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    /// Create a locally originated task with a freshly assigned identifier.
    pub fn new(model_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            model_id: model_id.into(),
            source: TaskSource::Local,
            device_id: device_id.into(),
            created_at: now,
            updated_at: now,
            duration_ms: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Field-by-field equality ignoring the volatile `updated_at` stamp.
    pub fn content_matches(&self, other: &Self) -> bool {
        self.id == other.id
            && self.status == other.status
            && self.model_id == other.model_id
            && self.source == other.source
            && self.device_id == other.device_id
            && self.created_at == other.created_at
            && self.duration_ms == other.duration_ms
            && self.metadata == other.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task::new("llama-3-8b", "device-1")
    }

    #[test]
    fn status_serialization_matches_gateway_contract() {
        let actual = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ]
        .iter()
        .map(|status| serde_json::to_string(status).expect("serialize task status"))
        .collect::<Vec<_>>();

        assert_eq!(
            actual,
            vec![
                "\"pending\"",
                "\"running\"",
                "\"completed\"",
                "\"failed\"",
                "\"cancelled\"",
            ]
        );
    }

    #[test]
    fn terminal_statuses_outrank_active_ones() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.lifecycle_rank() > TaskStatus::Running.lifecycle_rank());
        assert!(TaskStatus::Running.lifecycle_rank() > TaskStatus::Pending.lifecycle_rank());
    }

    #[test]
    fn content_match_ignores_updated_at() {
        let task = sample_task();
        let mut touched = task.clone();
        touched.updated_at = touched.updated_at + chrono::Duration::seconds(30);
        assert!(task.content_matches(&touched));

        let mut changed = task.clone();
        changed.status = TaskStatus::Running;
        assert!(!task.content_matches(&changed));
    }

    #[test]
    fn new_tasks_get_unique_ids() {
        let a = sample_task();
        let b = sample_task();
        assert_ne!(a.id, b.id);
        assert_eq!(a.source, TaskSource::Local);
    }
}
