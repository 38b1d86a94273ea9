//! Earning domain model for credit events tied to executed tasks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a credit/payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningType {
    TaskReward,
    Bonus,
    Adjustment,
}

/// One credit event, tied to zero-or-one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Earning {
    pub id: String,
    pub earning_type: EarningType,
    pub amount: Decimal,
    /// Earnings may reference tasks that have not synced yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Earning {
    /// Create an earning with a freshly assigned identifier.
    pub fn new(
        earning_type: EarningType,
        amount: Decimal,
        task_id: Option<String>,
        device_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            earning_type,
            amount,
            task_id,
            device_id: device_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Field-by-field equality ignoring the volatile `updated_at` stamp.
    pub fn content_matches(&self, other: &Self) -> bool {
        self.id == other.id
            && self.earning_type == other.earning_type
            && self.amount == other.amount
            && self.task_id == other.task_id
            && self.device_id == other.device_id
            && self.created_at == other.created_at
    }
}
