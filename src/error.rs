// src/error.rs
// Structured error types shared by every layer of the engine

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Error codes carried in every structured failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation (400-level)
    ValidationError,
    InvalidCoordinates,
    InvalidQuery,
    MissingParameter,

    // Authentication (401-level)
    AuthenticationError,
    TokenExpired,
    TokenInvalid,

    // Not found (404-level)
    NotFound,
    ObjectNotFound,
    BibcodeNotFound,
    CatalogNotFound,

    // Rate limit (429-level)
    RateLimitError,

    // Timeout (504-level)
    TimeoutError,

    // Service (500-level)
    ServiceError,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidCoordinates => "INVALID_COORDINATES",
            ErrorCode::InvalidQuery => "INVALID_QUERY",
            ErrorCode::MissingParameter => "MISSING_PARAMETER",
            ErrorCode::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenInvalid => "TOKEN_INVALID",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ObjectNotFound => "OBJECT_NOT_FOUND",
            ErrorCode::BibcodeNotFound => "BIBCODE_NOT_FOUND",
            ErrorCode::CatalogNotFound => "CATALOG_NOT_FOUND",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::ServiceError => "SERVICE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one failure shape that crosses the tool boundary.
///
/// Serializes to `{error: true, code, message, service, recoverable, suggestion, details}`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{code}] {service}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    pub service: String,
    pub recoverable: bool,
    pub suggestion: String,
    pub details: Map<String, Value>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            service: service.into(),
            recoverable: true,
            suggestion: String::new(),
            details: Map::new(),
        }
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Render as the structured JSON object returned to callers
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "error": true,
            "code": self.code.as_str(),
            "message": self.message,
            "service": self.service,
            "recoverable": self.recoverable,
            "suggestion": self.suggestion,
            "details": Value::Object(self.details.clone()),
        })
    }
}

impl Serialize for ToolError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Input failed validation; never retried.
pub fn validation_error(message: impl Into<String>, service: impl Into<String>) -> ToolError {
    ToolError::new(ErrorCode::ValidationError, message, service)
        .recoverable(false)
        .suggestion("Check input parameters and try again")
}

/// Target identifier does not exist upstream.
pub fn not_found_error(code: ErrorCode, message: impl Into<String>, service: impl Into<String>) -> ToolError {
    ToolError::new(code, message, service)
        .recoverable(false)
        .suggestion("Verify the identifier exists or try alternative search terms")
}

pub fn service_error(message: impl Into<String>, service: impl Into<String>) -> ToolError {
    ToolError::new(ErrorCode::ServiceError, message, service)
        .suggestion("The service may be temporarily unavailable. Try again later.")
}

pub fn timeout_error(timeout_secs: f64, service: impl Into<String>) -> ToolError {
    ToolError::new(
        ErrorCode::TimeoutError,
        format!("Operation timed out after {}s", timeout_secs),
        service,
    )
    .suggestion("Try again or increase timeout")
    .detail("timeout", timeout_secs)
}

pub fn authentication_error(service: &str, env_var: &str) -> ToolError {
    ToolError::new(
        ErrorCode::AuthenticationError,
        format!("Authentication required for {}", service),
        service,
    )
    .recoverable(false)
    .suggestion(format!("Set the {} environment variable with your API token", env_var))
    .detail("env_var", env_var)
}

pub fn rate_limit_error(message: impl Into<String>, service: impl Into<String>) -> ToolError {
    ToolError::new(ErrorCode::RateLimitError, message, service)
        .suggestion("Wait before retrying; the upstream service is throttling requests")
}

/// Connection-level failure kinds that are safe to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    Reset,
    Refused,
    Closed,
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionFailure::Reset => f.write_str("reset"),
            ConnectionFailure::Refused => f.write_str("refused"),
            ConnectionFailure::Closed => f.write_str("closed"),
        }
    }
}

/// Failure produced by invoking a backend operation
#[derive(Error, Debug, Clone)]
pub enum CallError {
    /// Arguments did not match the operation's signature
    #[error("{0}")]
    InvalidArguments(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection {kind}: {message}")]
    Connection {
        kind: ConnectionFailure,
        message: String,
    },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Parse(String),

    /// Request could not be built or its redirects followed
    #[error("request failed: {0}")]
    Request(String),

    /// Structured error raised by a deeper layer; surfaced unchanged
    #[error(transparent)]
    Domain(#[from] ToolError),
}

impl CallError {
    /// Whether the retry layer may attempt the call again
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Timeout(_) | CallError::Connection { .. })
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CallError::InvalidArguments(message.into())
    }

    /// Structured form of this failure, attributed to `service`
    pub fn into_tool_error(self, service: &str) -> ToolError {
        match self {
            CallError::Domain(e) => e,
            CallError::InvalidArguments(message) => validation_error(message, service),
            CallError::Timeout(message) => ToolError::new(ErrorCode::TimeoutError, message, service)
                .suggestion("Try again or increase timeout"),
            other => {
                let text = other.to_string();
                service_error(text.clone(), service).detail("error", text)
            }
        }
    }
}

/// Convenience type alias for Result using ToolError
pub type Result<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // ToolError shape
    // ============================================================================

    #[test]
    fn test_to_value_has_every_field() {
        let err = validation_error("Unknown module: foo", "executor").detail("params", vec!["a"]);
        let v = err.to_value();
        assert_eq!(v["error"], true);
        assert_eq!(v["code"], "VALIDATION_ERROR");
        assert_eq!(v["message"], "Unknown module: foo");
        assert_eq!(v["service"], "executor");
        assert_eq!(v["recoverable"], false);
        assert!(v["suggestion"].as_str().unwrap().contains("Check input"));
        assert_eq!(v["details"]["params"][0], "a");
    }

    #[test]
    fn test_serialize_matches_to_value() {
        let err = service_error("boom", "simbad");
        let s = serde_json::to_value(&err).unwrap();
        assert_eq!(s, err.to_value());
    }

    #[test]
    fn test_display() {
        let err = timeout_error(5.0, "gaia");
        assert_eq!(err.to_string(), "[TIMEOUT_ERROR] gaia: Operation timed out after 5s");
    }

    #[test]
    fn test_recoverability_defaults() {
        assert!(!validation_error("x", "s").recoverable);
        assert!(!not_found_error(ErrorCode::ObjectNotFound, "x", "s").recoverable);
        assert!(!authentication_error("ads", "ADS_TOKEN").recoverable);
        assert!(service_error("x", "s").recoverable);
        assert!(timeout_error(1.0, "s").recoverable);
        assert!(rate_limit_error("x", "s").recoverable);
    }

    #[test]
    fn test_authentication_error_names_env_var() {
        let err = authentication_error("ads", "ADS_TOKEN");
        assert!(err.suggestion.contains("ADS_TOKEN"));
        assert_eq!(err.details["env_var"], "ADS_TOKEN");
    }

    // ============================================================================
    // CallError classification
    // ============================================================================

    #[test]
    fn test_transient_kinds() {
        assert!(CallError::Timeout("t".into()).is_transient());
        for kind in [ConnectionFailure::Reset, ConnectionFailure::Refused, ConnectionFailure::Closed] {
            let err = CallError::Connection { kind, message: "x".into() };
            assert!(err.is_transient());
        }
        assert!(!CallError::invalid("bad").is_transient());
        assert!(!CallError::Http { status: 500, body: String::new() }.is_transient());
        assert!(!CallError::Parse("x".into()).is_transient());
        assert!(!CallError::Request("builder error".into()).is_transient());
        assert!(!CallError::Domain(service_error("x", "s")).is_transient());
    }

    #[test]
    fn test_domain_error_is_transparent() {
        let inner = not_found_error(ErrorCode::BibcodeNotFound, "no such bibcode", "ads");
        let err: CallError = inner.clone().into();
        assert_eq!(err.to_string(), inner.to_string());
    }

    #[test]
    fn test_into_tool_error() {
        let e = CallError::invalid("unexpected keyword 'foo'").into_tool_error("gaia");
        assert_eq!(e.code, ErrorCode::ValidationError);
        assert_eq!(e.service, "gaia");

        let e = CallError::Http { status: 503, body: "down".into() }.into_tool_error("irsa");
        assert_eq!(e.code, ErrorCode::ServiceError);
        assert_eq!(e.details["error"], "HTTP 503: down");

        let inner = rate_limit_error("slow down", "ads");
        assert_eq!(CallError::Domain(inner.clone()).into_tool_error("other"), inner);
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let s = serde_json::to_value(ErrorCode::CatalogNotFound).unwrap();
        assert_eq!(s, "CATALOG_NOT_FOUND");
        assert_eq!(ErrorCode::CatalogNotFound.as_str(), "CATALOG_NOT_FOUND");
    }
}
