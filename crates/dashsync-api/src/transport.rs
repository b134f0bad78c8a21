//! Shared HTTP transport and error mapping.

use dashsync_core::{SyncError, SyncResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub(crate) fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Unexpected(format!("Failed to create HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let request = self.client.get(self.url(path)).query(query);
        self.send(request, "GET", path).await
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: Option<&B>) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request, "POST", path).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let request = self.client.delete(self.url(path));
        self.send(request, "DELETE", path).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        method: &str,
        path: &str,
    ) -> SyncResult<T> {
        debug!(method, path, "HTTP request");

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!(method, path, status = status.as_u16(), "HTTP request failed");
            return Err(SyncError::from_status(status.as_u16(), body, retry_after_ms));
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Decode(format!("{method} {path}: {e}")))
    }
}

/// Map a reqwest failure that happened before a status was available.
pub(crate) fn map_transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        SyncError::TransientNetwork(e.to_string())
    } else if e.is_decode() || e.is_body() {
        SyncError::Decode(e.to_string())
    } else {
        SyncError::from_message(e.to_string())
    }
}

/// `Retry-After` in delta-seconds form, as milliseconds.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}
