pub mod auth;
pub mod devices;

use crate::config::ConfigManager;
use crate::error::{Result, SweepError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Retry settings for transient Graph failures (429, 5xx, connection errors)
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter, capped at `max_backoff_ms`
    fn backoff(&self, attempt: u32) -> Duration {
        let base_backoff = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_backoff = base_backoff.min(self.max_backoff_ms);

        let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
        let jitter = if jitter_range > 0 {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis((capped_backoff as i64 + jitter).max(0) as u64)
    }

    /// Delay requested by a 429, falling back to the initial backoff
    fn retry_after(&self, resp: &Response) -> Duration {
        resp.headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_millis(self.initial_backoff_ms))
    }
}

/// Graph API client with retry support
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GRAPH_API_BASE)
    }

    /// Point the client at another Graph root (the beta endpoint, or a mock server)
    pub fn with_base_url(access_token: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load the cached token for `tenant_name`
    pub async fn from_config(config: &ConfigManager, tenant_name: &str) -> Result<Self> {
        let graph_auth = auth::GraphAuth::new(config.clone());
        let access_token = graph_auth.get_access_token(tenant_name).await?;

        Ok(Self::new(access_token))
    }

    /// Absolute URLs (such as `@odata.nextLink`) pass through untouched
    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        let resp = self
            .send_with_retry("GET", &url, || self.client.get(&url))
            .await?;
        Ok(resp.json::<T>().await?)
    }

    /// POST to an action endpoint that answers 204 No Content
    pub async fn post_action(&self, endpoint: &str) -> Result<()> {
        let url = self.url(endpoint);
        self.send_with_retry("POST", &url, || {
            self.client
                .post(&url)
                .header(reqwest::header::CONTENT_LENGTH, 0)
        })
        .await?;
        Ok(())
    }

    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        let url = self.url(endpoint);
        self.send_with_retry("DELETE", &url, || self.client.delete(&url))
            .await?;
        Ok(())
    }

    /// Send a request, retrying on 429, 5xx and connection errors.
    /// Any other non-success status fails immediately.
    async fn send_with_retry<F>(&self, method: &str, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_retries = self.retry.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_retries {
            let response = build().bearer_auth(&self.access_token).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait_time = self.retry.retry_after(&resp);
                        tracing::warn!(
                            "Rate limited (429) on {} {}. Retrying in {:?}... (attempt {}/{})",
                            method,
                            url,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        if attempt + 1 < max_retries {
                            tokio::time::sleep(wait_time).await;
                        }
                        continue;
                    }

                    if status.is_server_error() && attempt < max_retries - 1 {
                        let wait_time = self.retry.backoff(attempt);
                        tracing::warn!(
                            "Server error ({}) on {} {}. Retrying in {:?}... (attempt {}/{})",
                            status,
                            method,
                            url,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = resp.text().await.unwrap_or_default();
                        let enhanced_error = crate::error::enhance_graph_error(&error_text);
                        return Err(SweepError::GraphApiError(format!(
                            "HTTP {}: {}",
                            status, enhanced_error
                        )));
                    }

                    tracing::debug!("{} {} -> {}", method, url, status);
                    return Ok(resp);
                }
                Err(e) => {
                    if attempt < max_retries - 1 {
                        let wait_time = self.retry.backoff(attempt);
                        tracing::warn!(
                            "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                            e,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(|e| e.into()).unwrap_or_else(|| {
            SweepError::GraphApiError(format!(
                "{} {} failed after {} retries",
                method, url, max_retries
            ))
        }))
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// Standard OData page: `value` array plus `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count")]
    pub count: Option<i64>,
}

impl GraphClient {
    /// Fetch every page of an endpoint, following `@odata.nextLink`
    ///
    /// ```ignore
    /// let devices: Vec<GraphManagedDevice> =
    ///     client.get_all_pages("deviceManagement/managedDevices").await?;
    /// ```
    pub async fn get_all_pages<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current = self.url(endpoint);
        let mut pages = 0usize;

        loop {
            let response: PaginatedResponse<T> = self.get(&current).await?;
            all_items.extend(response.value);
            pages += 1;

            match response.next_link {
                Some(next) => current = next,
                None => break,
            }
        }

        tracing::debug!(pages, items = all_items.len(), "fetched {}", endpoint);
        Ok(all_items)
    }
}
