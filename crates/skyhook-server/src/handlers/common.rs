//! Shared handler plumbing: error envelopes, SSE response assembly,
//! credential scope resolution, and log recording.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::{json, Value};

use skyhook_core::ids;
use skyhook_upstream::credentials::{Credential, CredentialPool};
use skyhook_upstream::error::UpstreamResult;

use crate::logs::{LogDetail, LogEntry, LogStore, ResponseSnapshot};
use crate::state::AppState;

/// OpenAI-style error type slug for a status code.
#[must_use]
pub fn error_type(status: u16) -> &'static str {
    match status {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        _ => "server_error",
    }
}

/// OpenAI/Gemini error envelope.
#[must_use]
pub fn dialect_error(status: u16, message: &str) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        code,
        Json(json!({
            "error": {"message": message, "type": error_type(status)}
        })),
    )
        .into_response()
}

/// Claude error envelope.
#[must_use]
pub fn claude_error(status: u16, kind: &str, message: &str) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        code,
        Json(json!({
            "type": "error",
            "error": {"type": kind, "message": message}
        })),
    )
        .into_response()
}

/// Wrap a frame stream in an SSE response with anti-buffering headers.
#[must_use]
pub fn sse_response(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

/// Per-request identity derived from the acquired credential.
#[derive(Clone, Debug)]
pub struct CredentialScope {
    /// Upstream project (credential's, or generated).
    pub project: String,
    /// Credential session token.
    pub session_id: String,
    /// Relay user agent.
    pub user_agent: String,
}

impl CredentialScope {
    /// Resolve the scope for one request.
    #[must_use]
    pub fn resolve(credential: &Credential, state: &AppState) -> Self {
        let project = if credential.project_id.is_empty() {
            ids::project_id()
        } else {
            credential.project_id.clone()
        };
        Self {
            project,
            session_id: credential.session_id.clone(),
            user_agent: state.config.user_agent.clone(),
        }
    }
}

/// Acquire a credential, honoring an optional pin (`email` when it
/// contains `@`, otherwise a project ID).
pub async fn acquire_credential(
    pool: &CredentialPool,
    pin: Option<&str>,
) -> UpstreamResult<Credential> {
    match pin {
        Some(pin) if pin.contains('@') => pool.acquire_by_email(pin).await,
        Some(pin) => pool.acquire_by_project(pin).await,
        None => pool.acquire().await,
    }
}

/// Disable the failing credential when the upstream said so.
pub async fn maybe_disable_credential(
    pool: &CredentialPool,
    credential: &Credential,
    err: &skyhook_upstream::error::UpstreamError,
) {
    if err.disables_credential() {
        pool.disable_by_session(&credential.session_id).await;
    }
}

/// Ingredients for one log record.
pub struct LogParams<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Request path.
    pub path: &'a str,
    /// Client-facing model.
    pub model: &'a str,
    /// Status returned to the client.
    pub status: u16,
    /// Whether the relay succeeded.
    pub success: bool,
    /// Wall time in milliseconds.
    pub duration_ms: i64,
    /// Error message, when failed.
    pub message: &'a str,
    /// Decoded client request body.
    pub request_body: Option<Value>,
    /// Concatenated model output.
    pub model_output: &'a str,
    /// The credential used, when one was acquired.
    pub credential: Option<&'a Credential>,
}

/// Record one relayed request in the log store.
pub fn record_log(logs: &Arc<LogStore>, params: &LogParams<'_>) {
    let mut entry = LogEntry {
        id: ids::request_id(),
        timestamp: Utc::now(),
        status: params.status,
        success: params.success,
        project_id: String::new(),
        email: String::new(),
        model: params.model.to_string(),
        method: params.method.to_string(),
        path: params.path.to_string(),
        duration_ms: params.duration_ms,
        message: params.message.to_string(),
        has_detail: true,
        detail: Some(LogDetail {
            request: params.request_body.clone(),
            response: Some(ResponseSnapshot {
                status_code: params.status,
                model_output: params.model_output.to_string(),
            }),
        }),
    };
    if let Some(credential) = params.credential {
        entry.project_id = credential.project_id.clone();
        entry.email = credential.email.clone();
    }
    logs.add(entry);
}

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_mapping() {
        assert_eq!(error_type(400), "invalid_request_error");
        assert_eq!(error_type(401), "authentication_error");
        assert_eq!(error_type(403), "permission_error");
        assert_eq!(error_type(404), "not_found_error");
        assert_eq!(error_type(429), "rate_limit_error");
        assert_eq!(error_type(500), "server_error");
        assert_eq!(error_type(503), "server_error");
    }

    #[test]
    fn dialect_error_status() {
        let resp = dialect_error(429, "slow down");
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn claude_error_status() {
        let resp = claude_error(503, "api_error", "no credential");
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn sse_response_headers() {
        let resp = sse_response(Body::empty());
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(resp.headers().get("x-accel-buffering").unwrap(), "no");
    }
}
