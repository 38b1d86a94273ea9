//! HTTP client for the gateway sync REST API.
//!
//! The client performs exactly one attempt per call; retry and backoff
//! policy belongs to the synchronizers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use gridnode_core::sync::{Earning, GatewayCredentials, Task};

use crate::error::{Result, SyncError};
use crate::types::*;

/// Short fixed timeout for the connectivity probe, independent of the
/// configured request timeout.
const CONNECTIVITY_PROBE_TIMEOUT_SECS: u64 = 5;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Network boundary consumed by the synchronizers and diagnostics.
///
/// Implemented by [`GatewayClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn fetch_tasks(
        &self,
        params: &FetchParams,
        filters: Option<&TaskFilters>,
    ) -> Result<FetchResponse<Task>>;

    async fn fetch_earnings(
        &self,
        params: &FetchParams,
        filters: Option<&EarningFilters>,
    ) -> Result<FetchResponse<Earning>>;

    async fn upload_tasks(&self, records: &[Task]) -> Result<UploadResponse>;

    async fn upload_earnings(&self, records: &[Earning]) -> Result<UploadResponse>;

    /// Lightweight probe used by health diagnostics, never by the sync
    /// path itself.
    async fn check_connectivity(&self) -> Result<()>;

    /// Gateway clock, used as the watermark basis to tolerate device
    /// clock skew.
    async fn get_server_time(&self) -> Result<DateTime<Utc>>;
}

/// reqwest-backed implementation of [`GatewayApi`].
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
    auth_key: String,
}

impl GatewayClient {
    /// Create a new gateway client.
    ///
    /// Fails fast on missing credentials or an unconstructible HTTP
    /// client; nothing touches the network here.
    pub fn new(credentials: &GatewayCredentials, request_timeout: Duration) -> Result<Self> {
        credentials.validate().map_err(SyncError::config)?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: credentials.gateway_address.trim_end_matches('/').to_string(),
            device_id: credentials.device_id.clone(),
            auth_key: credentials.auth_key.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.auth_key))
            .map_err(|_| SyncError::config("auth key contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let device_value = HeaderValue::from_str(&self.device_id)
            .map_err(|_| SyncError::config("device ID contains invalid header characters"))?;
        headers.insert("x-gridnode-device-id", device_value);

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("gateway response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("gateway response error ({}): {}", status, preview);
    }

    /// Parse a JSON response body, mapping non-2xx and malformed payloads
    /// to distinct failure reasons.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(SyncError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(SyncError::api(
                status.as_u16(),
                format!("request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!("failed to deserialize gateway response: {} (body: {})", e, body);
            SyncError::api(status.as_u16(), format!("malformed payload: {}", e))
        })
    }

    fn fetch_query(
        &self,
        params: &FetchParams,
        filter_pairs: Vec<(&'static str, String)>,
    ) -> Vec<(&'static str, String)> {
        let mut query: Vec<(&'static str, String)> = vec![
            ("deviceId", self.device_id.clone()),
            ("page", params.page.to_string()),
            ("pageSize", params.page_size.to_string()),
        ];
        if let Some(watermark) = params.last_sync_time {
            query.push((
                "lastSyncTime",
                watermark.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        query.extend(filter_pairs);
        query
    }

    async fn fetch_page<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &FetchParams,
        filter_pairs: Vec<(&'static str, String)>,
    ) -> Result<FetchResponse<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(
            "fetching {} page={} pageSize={} since={:?}",
            path, params.page, params.page_size, params.last_sync_time
        );

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .query(&self.fetch_query(params, filter_pairs))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn upload_batch<T: serde::Serialize>(
        &self,
        path: &str,
        records: &[T],
    ) -> Result<UploadResponse> {
        if records.is_empty() {
            return Err(SyncError::invalid_request("upload batch is empty"));
        }
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&serde_json::json!({
                "deviceId": self.device_id,
                "records": records,
            }))
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    /// Fetch one page of tasks.
    ///
    /// GET /api/v1/sync/tasks
    async fn fetch_tasks(
        &self,
        params: &FetchParams,
        filters: Option<&TaskFilters>,
    ) -> Result<FetchResponse<Task>> {
        let mut pairs = Vec::new();
        if let Some(filters) = filters {
            if let Some(status) = filters.status {
                pairs.push(("status", enum_query_value(&status)?));
            }
            if let Some(model_id) = &filters.model_id {
                pairs.push(("modelId", model_id.clone()));
            }
        }
        self.fetch_page("/api/v1/sync/tasks", params, pairs).await
    }

    /// Fetch one page of earnings.
    ///
    /// GET /api/v1/sync/earnings
    async fn fetch_earnings(
        &self,
        params: &FetchParams,
        filters: Option<&EarningFilters>,
    ) -> Result<FetchResponse<Earning>> {
        let mut pairs = Vec::new();
        if let Some(filters) = filters {
            if let Some(earning_type) = filters.earning_type {
                pairs.push(("earningType", enum_query_value(&earning_type)?));
            }
            if let Some(task_id) = &filters.task_id {
                pairs.push(("taskId", task_id.clone()));
            }
        }
        self.fetch_page("/api/v1/sync/earnings", params, pairs).await
    }

    /// Upload a batch of tasks.
    ///
    /// POST /api/v1/sync/tasks/upload
    async fn upload_tasks(&self, records: &[Task]) -> Result<UploadResponse> {
        self.upload_batch("/api/v1/sync/tasks/upload", records).await
    }

    /// Upload a batch of earnings.
    ///
    /// POST /api/v1/sync/earnings/upload
    async fn upload_earnings(&self, records: &[Earning]) -> Result<UploadResponse> {
        self.upload_batch("/api/v1/sync/earnings/upload", records).await
    }

    /// Probe the gateway health endpoint with a short fixed timeout.
    ///
    /// GET /api/v1/ping
    async fn check_connectivity(&self) -> Result<()> {
        let url = format!("{}/api/v1/ping", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .timeout(Duration::from_secs(CONNECTIVITY_PROBE_TIMEOUT_SECS))
            .send()
            .await?;

        let _: PingResponse = Self::parse_response(response).await?;
        Ok(())
    }

    /// Query the gateway clock.
    ///
    /// GET /api/v1/time
    async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        let url = format!("{}/api/v1/time", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        let parsed: ServerTimeResponse = Self::parse_response(response).await?;
        Ok(parsed.server_time)
    }
}

/// Render a snake_case enum as its wire string for query parameters.
fn enum_query_value<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}
