//! Conflict detection and resolution between local and remote record versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConflictStrategy, Earning, Task};

/// Which version of the data the resolver selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    Local,
    Remote,
    Merged,
    /// Manual strategy: the conflict is reported, nothing is written.
    Deferred,
}

/// Resolver verdict for one conflicting identifier.
///
/// `confidence` is a heuristic score in `[0, 1]` used only for reporting,
/// never for control flow.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResolution<T> {
    pub resolution: ResolutionChoice,
    pub resolved: Option<T>,
    pub reason: String,
    pub confidence: f64,
}

/// Transient pairing of two versions of the same logical record.
///
/// Produced only when both sides exist and differ; consumed immediately
/// by the resolver and discarded.
#[derive(Debug, Clone)]
pub struct ConflictRecord<T> {
    pub local: T,
    pub remote: T,
}

impl ConflictRecord<Task> {
    pub fn resolve(&self, strategy: ConflictStrategy) -> ConflictResolution<Task> {
        resolve_task_conflict(&self.local, &self.remote, strategy)
    }
}

impl ConflictRecord<Earning> {
    pub fn resolve(&self, strategy: ConflictStrategy) -> ConflictResolution<Earning> {
        resolve_earning_conflict(&self.local, &self.remote, strategy)
    }
}

fn latest_wins<T: Clone>(
    local: &T,
    remote: &T,
    local_updated: DateTime<Utc>,
    remote_updated: DateTime<Utc>,
) -> ConflictResolution<T> {
    if local_updated > remote_updated {
        ConflictResolution {
            resolution: ResolutionChoice::Local,
            resolved: Some(local.clone()),
            reason: format!(
                "local updated {} is newer than remote {}",
                local_updated, remote_updated
            ),
            confidence: 0.9,
        }
    } else if remote_updated > local_updated {
        ConflictResolution {
            resolution: ResolutionChoice::Remote,
            resolved: Some(remote.clone()),
            reason: format!(
                "remote updated {} is newer than local {}",
                remote_updated, local_updated
            ),
            confidence: 0.9,
        }
    } else {
        // Exact tie: the gateway is the authority of record for
        // concurrent edits.
        ConflictResolution {
            resolution: ResolutionChoice::Remote,
            resolved: Some(remote.clone()),
            reason: "updated timestamps tie; gateway copy preferred".to_string(),
            confidence: 0.6,
        }
    }
}

fn fixed_winner<T: Clone>(winner: &T, choice: ResolutionChoice, reason: &str) -> ConflictResolution<T> {
    ConflictResolution {
        resolution: choice,
        resolved: Some(winner.clone()),
        reason: reason.to_string(),
        confidence: 1.0,
    }
}

fn deferred<T>() -> ConflictResolution<T> {
    ConflictResolution {
        resolution: ResolutionChoice::Deferred,
        resolved: None,
        reason: "manual strategy; conflict recorded for operator attention".to_string(),
        confidence: 0.0,
    }
}

fn merge_tasks(local: &Task, remote: &Task) -> Task {
    let (newer, older) = if remote.updated_at >= local.updated_at {
        (remote, local)
    } else {
        (local, remote)
    };

    // Keep the more advanced status along the monotonic lifecycle;
    // equal rank falls back to the newer record.
    let status = if local.status.lifecycle_rank() == remote.status.lifecycle_rank() {
        newer.status
    } else if local.status.lifecycle_rank() > remote.status.lifecycle_rank() {
        local.status
    } else {
        remote.status
    };

    // Union of metadata keys; a contested key takes the newer record's
    // value unless that value is null.
    let mut metadata = older.metadata.clone();
    for (key, value) in &newer.metadata {
        if value.is_null() && metadata.contains_key(key) {
            continue;
        }
        metadata.insert(key.clone(), value.clone());
    }

    let non_empty = |preferred: &str, fallback: &str| {
        if preferred.trim().is_empty() {
            fallback.to_string()
        } else {
            preferred.to_string()
        }
    };

    Task {
        id: local.id.clone(),
        status,
        model_id: non_empty(&newer.model_id, &older.model_id),
        source: newer.source,
        device_id: non_empty(&newer.device_id, &older.device_id),
        created_at: local.created_at.min(remote.created_at),
        updated_at: local.updated_at.max(remote.updated_at),
        duration_ms: newer.duration_ms.or(older.duration_ms),
        metadata,
    }
}

/// Resolve a task conflict according to the configured strategy.
pub fn resolve_task_conflict(
    local: &Task,
    remote: &Task,
    strategy: ConflictStrategy,
) -> ConflictResolution<Task> {
    match strategy {
        ConflictStrategy::LocalWins => {
            fixed_winner(local, ResolutionChoice::Local, "local-wins strategy")
        }
        ConflictStrategy::RemoteWins => {
            fixed_winner(remote, ResolutionChoice::Remote, "remote-wins strategy")
        }
        ConflictStrategy::LatestWins => {
            latest_wins(local, remote, local.updated_at, remote.updated_at)
        }
        ConflictStrategy::Merge => ConflictResolution {
            resolution: ResolutionChoice::Merged,
            resolved: Some(merge_tasks(local, remote)),
            reason: "field-level merge of local and remote task".to_string(),
            confidence: 0.7,
        },
        ConflictStrategy::Manual => deferred(),
    }
}

/// Resolve an earning conflict according to the configured strategy.
///
/// Earnings have no mergeable sub-structure; the merge strategy falls
/// back to latest-wins rather than mixing scalar money fields.
pub fn resolve_earning_conflict(
    local: &Earning,
    remote: &Earning,
    strategy: ConflictStrategy,
) -> ConflictResolution<Earning> {
    match strategy {
        ConflictStrategy::LocalWins => {
            fixed_winner(local, ResolutionChoice::Local, "local-wins strategy")
        }
        ConflictStrategy::RemoteWins => {
            fixed_winner(remote, ResolutionChoice::Remote, "remote-wins strategy")
        }
        ConflictStrategy::LatestWins => {
            latest_wins(local, remote, local.updated_at, remote.updated_at)
        }
        ConflictStrategy::Merge => {
            let mut resolution = latest_wins(local, remote, local.updated_at, remote.updated_at);
            resolution.reason = format!("merge falls back to latest-wins: {}", resolution.reason);
            resolution
        }
        ConflictStrategy::Manual => deferred(),
    }
}
