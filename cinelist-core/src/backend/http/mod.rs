//! HTTP adapters for a hosted auth + REST backend.
//!
//! `HttpAuthBackend` speaks the `/auth/v1` session endpoints and
//! `HttpListStore` the `/rest/v1` table endpoints. Both share one
//! [`RestClient`] and one [`SessionHandle`], so the list store always uses
//! whichever session the auth adapter currently holds.

use std::sync::Arc;
use std::time::Duration;

use cinelist_model::Session;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::BackendError;

mod auth;
mod lists;

pub use auth::HttpAuthBackend;
pub use lists::HttpListStore;

/// Session shared between the HTTP adapters.
pub type SessionHandle = Arc<RwLock<Option<Session>>>;

/// Thin wrapper over `reqwest` that knows the backend base URL and API key.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url.into()),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach the API key and, when given, the session's bearer token.
    pub(crate) fn authorize(
        &self,
        builder: RequestBuilder,
        session: Option<&Session>,
    ) -> RequestBuilder {
        let bearer = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(self.api_key.as_str());
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub(crate) fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path))
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }

    /// Send a request and decode a JSON body.
    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                BackendError::InvalidResponse(format!(
                    "failed to decode response: {e}"
                ))
            });
        }
        Err(Self::error_from(status, response).await)
    }

    /// Send a request whose body is irrelevant.
    pub(crate) async fn execute_empty(
        &self,
        request: RequestBuilder,
    ) -> Result<(), BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::error_from(status, response).await)
    }

    async fn error_from(
        status: StatusCode,
        response: reqwest::Response,
    ) -> BackendError {
        if status == StatusCode::UNAUTHORIZED {
            return BackendError::Unauthorized;
        }
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = extract_error_message(&text).unwrap_or(text);
        debug!(status = status.as_u16(), %message, "backend request failed");
        BackendError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

// Many users will provide "localhost:54321" which reqwest rejects; add a scheme
// and trim a trailing slash to prevent double slashes.
fn normalize_base_url(raw: String) -> String {
    let trimmed = raw.trim().trim_end_matches('/').to_string();
    let normalized = if trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
    {
        trimmed
    } else {
        format!("http://{trimmed}")
    };
    if normalized != raw {
        warn!(from = %raw, to = %normalized, "normalized backend base URL");
    }
    normalized
}

/// Auth and REST endpoints report errors under a handful of different keys.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
