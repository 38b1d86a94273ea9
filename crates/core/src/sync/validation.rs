//! Pure per-record integrity checks run before persistence or upload.

use rust_decimal::Decimal;

use super::{Earning, EarningType, Task};

/// Outcome of validating a single record.
///
/// An invalid record is skipped and counted as an error by the caller;
/// it never aborts the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult<T> {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// A cleaned-up copy when the record is salvageable as-is.
    pub corrected: Option<T>,
}

impl<T> ValidationResult<T> {
    fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            corrected: None,
        }
    }

    fn error(mut self, message: impl Into<String>) -> Self {
        self.is_valid = false;
        self.errors.push(message.into());
        self
    }

    fn warning(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(message.into());
        self
    }
}

/// Validate a task record.
pub fn validate_task(task: &Task) -> ValidationResult<Task> {
    let mut result = ValidationResult::valid();

    if task.id.trim().is_empty() {
        result = result.error("task identifier is empty");
    }
    if task.created_at > task.updated_at {
        result = result.error(format!(
            "task {} created_at {} is after updated_at {}",
            task.id, task.created_at, task.updated_at
        ));
    }
    if task.device_id.trim().is_empty() {
        result = result.warning(format!("task {} has no device identifier", task.id));
    }
    if let Some(duration) = task.duration_ms {
        if duration < 0 {
            // Negative durations come from clock adjustments mid-task;
            // the record itself is still usable without the duration.
            let mut corrected = task.clone();
            corrected.duration_ms = None;
            result = result.warning(format!(
                "task {} reported negative duration {}ms; duration cleared",
                task.id, duration
            ));
            result.corrected = Some(corrected);
        }
    }

    result
}

/// Validate an earning record.
///
/// `task_exists` is the caller's answer to "does the referenced task exist
/// locally" — `None` when the earning references no task. A dangling
/// reference is a warning, not an error, since tasks may sync out of order.
pub fn validate_earning(earning: &Earning, task_exists: Option<bool>) -> ValidationResult<Earning> {
    let mut result = ValidationResult::valid();

    if earning.id.trim().is_empty() {
        result = result.error("earning identifier is empty");
    }
    if earning.amount < Decimal::ZERO {
        result = result.error(format!(
            "earning {} has negative amount {}",
            earning.id, earning.amount
        ));
    }
    if earning.earning_type == EarningType::TaskReward && earning.amount == Decimal::ZERO {
        result = result.warning(format!("task reward {} has a zero amount", earning.id));
    }
    if earning.task_id.is_some() && task_exists == Some(false) {
        result = result.warning(format!(
            "earning {} references task {} which is not present locally",
            earning.id,
            earning.task_id.as_deref().unwrap_or_default()
        ));
    }

    result
}
