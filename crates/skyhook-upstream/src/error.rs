//! Upstream error taxonomy.
//!
//! The upstream reports errors as `{error:{code,status,message,details}}`
//! where `code` may be a number or a gRPC-style status string. Both are
//! normalized into [`ApiError`], the unit the retry policy and the
//! request pipeline operate on.

use std::time::Duration;

use serde::Deserialize;

/// Result alias for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// A decoded upstream API error.
#[derive(Clone, Debug)]
pub struct ApiError {
    /// Effective HTTP status.
    pub status: u16,
    /// Upstream-provided message.
    pub message: String,
    /// Retry hint from `RetryInfo.retryDelay`, if present.
    pub retry_delay: Option<Duration>,
    /// Set on `UNAUTHENTICATED`: the credential should be disabled.
    pub disable_token: bool,
}

impl ApiError {
    /// Plain error with no retry hint.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_delay: None,
            disable_token: false,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error {}: {}", self.status, self.message)
    }
}

/// Errors that can occur while talking to the upstream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Body (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The upstream returned an error payload.
    #[error("{0}")]
    Api(ApiError),

    /// No enabled, refreshable credential in the pool.
    #[error("no credential available")]
    NoCredential,

    /// OAuth refresh or exchange failed.
    #[error("auth error: {0}")]
    Auth(String),
}

impl UpstreamError {
    /// The HTTP status to surface to the client.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Api(e) => e.status,
            Self::NoCredential => 503,
            _ => 500,
        }
    }

    /// Whether the failing credential should be disabled.
    #[must_use]
    pub fn disables_credential(&self) -> bool {
        matches!(self, Self::Api(e) if e.disable_token)
    }

    /// The retry hint, if the upstream provided one.
    #[must_use]
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Api(e) => e.retry_delay,
            _ => None,
        }
    }
}

/// Wire shape of the upstream error body.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "@type", default)]
    type_url: String,
    #[serde(rename = "retryDelay", default)]
    retry_delay: String,
}

/// Decode an upstream error body into an [`ApiError`].
///
/// Falls back to the transport status and a generic message when the
/// body is not the expected envelope.
#[must_use]
pub fn extract_error_details(http_status: u16, body: &[u8]) -> ApiError {
    let mut api_err = ApiError::new(http_status, "Unknown error");

    let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) else {
        return api_err;
    };

    if !envelope.error.message.is_empty() {
        api_err.message = envelope.error.message;
    }

    match envelope.error.code {
        Some(serde_json::Value::String(code)) => match code.to_ascii_uppercase().as_str() {
            "RESOURCE_EXHAUSTED" => api_err.status = 429,
            "INTERNAL" => api_err.status = 500,
            "UNAUTHENTICATED" => {
                api_err.status = 401;
                api_err.disable_token = true;
            }
            _ => {}
        },
        Some(serde_json::Value::Number(code)) => {
            if let Some(n) = code.as_u64() {
                if let Ok(status) = u16::try_from(n) {
                    api_err.status = status;
                }
            }
        }
        _ => {}
    }

    for detail in envelope.error.details {
        if detail.type_url.contains("RetryInfo") {
            if let Some(delay) = parse_retry_delay(&detail.retry_delay) {
                api_err.retry_delay = Some(delay);
            }
        }
    }

    api_err
}

/// Parse a `"1.5s"`-style retry delay.
fn parse_retry_delay(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim().strip_suffix('s')?;
    let seconds: f64 = trimmed.parse().ok()?;
    if seconds.is_sign_negative() || !seconds.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(seconds))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
