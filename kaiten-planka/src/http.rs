//! Plumbing shared by the Kaiten and Planka clients: the pooled
//! `reqwest::Client`, status checks and body decoding into core errors.

use std::time::Duration;

use kaiten_planka_core::{Error, Result};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

/// Error bodies are cut to this many characters in error messages.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            pool_max_idle_per_host: 16,
        }
    }
}

/// One client per run, shared by both services so connections are pooled.
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .pool_max_idle_per_host(settings.pool_max_idle_per_host)
        .build()
        .map_err(|e| Error::Config(format!("cannot build http client: {e}")))
}

/// Sends the request and turns network failures and non-2xx statuses into
/// [`Error::Transport`].
pub async fn send(context: &str, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(|e| {
        error!(context, error = %e, "[HTTP] Request failed");
        Error::transport(context, e)
    })?;

    let status = response.status();
    if status.is_success() {
        debug!(context, status = status.as_u16(), "[HTTP] Response");
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(context, status = status.as_u16(), "[HTTP] Non-success status");
    Err(Error::transport(
        context,
        format!("status {}: {}", status.as_u16(), truncate(&body)),
    ))
}

/// [`send`], then decode the JSON body into `T`.
pub async fn send_json<T: DeserializeOwned>(context: &str, request: RequestBuilder) -> Result<T> {
    let response = send(context, request).await?;
    let body = response
        .text()
        .await
        .map_err(|e| Error::transport(context, e))?;
    serde_json::from_str(&body).map_err(|e| {
        error!(context, error = %e, "[HTTP] Unexpected response body");
        Error::decode(context, e)
    })
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
