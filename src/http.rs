// src/http.rs
// Shared HTTP client and response classification for remote archives

use crate::error::{
    CallError, ConnectionFailure, ErrorCode, ToolError, not_found_error, rate_limit_error,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Default connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sent with every request so archive operators can identify the client
pub const USER_AGENT: &str = concat!("astro-mcp/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body carried into failures
const MAX_ERROR_BODY: usize = 500;

/// Create the shared HTTP client.
///
/// Created once at startup and handed to every backend. Uses connection
/// pooling internally.
pub fn create_shared_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport failure onto the retry classification.
///
/// Only timeouts and connection-level failures come back transient.
pub fn classify_reqwest_error(e: reqwest::Error) -> CallError {
    let message = e.to_string();
    if e.is_timeout() {
        CallError::Timeout(message)
    } else if e.is_builder() || e.is_redirect() {
        CallError::Request(message)
    } else if e.is_connect() {
        CallError::Connection {
            kind: ConnectionFailure::Refused,
            message,
        }
    } else if e.is_request() || e.is_body() {
        CallError::Connection {
            kind: ConnectionFailure::Closed,
            message,
        }
    } else if e.is_decode() {
        CallError::Parse(message)
    } else {
        CallError::Request(message)
    }
}

/// Turn a non-success status into a failure; pass successes through
pub async fn check_status(service: &str, response: Response) -> Result<Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(service, status, &url, body))
}

fn status_error(service: &str, status: StatusCode, url: &str, body: String) -> CallError {
    let body = crate::utils::truncate(&body, MAX_ERROR_BODY);
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            rate_limit_error(format!("{} rejected the request rate", service), service)
                .detail("status", status.as_u16())
                .into()
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ToolError::new(
            ErrorCode::AuthenticationError,
            format!("{} refused the credentials (HTTP {})", service, status.as_u16()),
            service,
        )
        .recoverable(false)
        .suggestion("Check that the configured API token is valid")
        .detail("status", status.as_u16())
        .into(),
        StatusCode::NOT_FOUND => not_found_error(
            ErrorCode::NotFound,
            format!("Resource not found: {}", url),
            service,
        )
        .detail("url", url)
        .into(),
        _ => CallError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

/// Send a request and return the body text after status checks
pub async fn send_text(service: &str, request: RequestBuilder) -> Result<String, CallError> {
    let response = request.send().await.map_err(classify_reqwest_error)?;
    let response = check_status(service, response).await?;
    response.text().await.map_err(classify_reqwest_error)
}

/// Send a request and decode the body as JSON
pub async fn send_json(service: &str, request: RequestBuilder) -> Result<Value, CallError> {
    let text = send_text(service, request.header("Accept", "application/json")).await?;
    serde_json::from_str(&text).map_err(|e| CallError::Parse(format!("invalid JSON from {}: {}", service, e)))
}
