//! Shared HTTP plumbing for the REST adapters.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::trace;

use super::ProviderError;

/// Longest error body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Build the HTTP client shared by all adapters of one configuration.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cdnd/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))
}

/// Send a request and map the response status onto [`ProviderError`].
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();

    trace!(status = status.as_u16(), url = %response.url(), "provider API response");

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = excerpt(&body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Auth(message)),
        _ => Err(ProviderError::Api {
            status: Some(status.as_u16()),
            message,
        }),
    }
}

/// Send a request and decode a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    send(request)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ProviderError::api(format!("invalid response body: {e}")))
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Api {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Trim a configured endpoint so paths can be appended with `/`.
pub(crate) fn base_url(configured: Option<&str>, default: &str) -> String {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}
