//! Wire types for the gateway sync REST API.

use chrono::{DateTime, Utc};
use gridnode_core::sync::{EarningType, TaskStatus};
use serde::{Deserialize, Serialize};

/// Pagination/watermark parameters for one fetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub page: u32,
    pub page_size: usize,
    /// Server filters to records updated at-or-after this watermark.
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl FetchParams {
    pub fn first_page(page_size: usize, last_sync_time: Option<DateTime<Utc>>) -> Self {
        Self {
            page: 1,
            page_size,
            last_sync_time,
        }
    }
}

/// Structured server-side filters for task fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

/// Structured server-side filters for earning fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earning_type: Option<EarningType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// One page of records as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: usize,
    pub has_more: bool,
}

/// Envelope around a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse<T> {
    pub success: bool,
    pub data: Page<T>,
    pub server_time: DateTime<Utc>,
    pub version: String,
}

/// Per-record upload failure detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub message: String,
}

/// Batch upload outcome. Partial failure is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub uploaded: usize,
    pub failed: usize,
    #[serde(default)]
    pub errors: Vec<UploadError>,
}

/// Gateway clock reading used for skew-tolerant watermarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTimeResponse {
    pub server_time: DateTime<Utc>,
}

/// Connectivity probe payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: String,
}

/// Structured error body returned by the gateway on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_envelope_round_trips_camel_case() {
        let body = r#"{
            "success": true,
            "data": {"data": [], "total": 0, "page": 1, "pageSize": 100, "hasMore": false},
            "serverTime": "2026-08-01T12:00:00Z",
            "version": "1"
        }"#;
        let parsed: FetchResponse<serde_json::Value> =
            serde_json::from_str(body).expect("parse fetch envelope");
        assert!(parsed.success);
        assert_eq!(parsed.data.page_size, 100);
        assert!(!parsed.data.has_more);
    }

    #[test]
    fn upload_response_defaults_missing_errors() {
        let body = r#"{"success": true, "uploaded": 4, "failed": 0}"#;
        let parsed: UploadResponse = serde_json::from_str(body).expect("parse upload response");
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.uploaded, 4);
    }

    #[test]
    fn filters_serialize_without_empty_fields() {
        let filters = TaskFilters {
            status: Some(TaskStatus::Completed),
            model_id: None,
        };
        let json = serde_json::to_string(&filters).expect("serialize filters");
        assert_eq!(json, r#"{"status":"completed"}"#);
    }
}
