//! Request middleware: client API-key auth and panel-session auth.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::state::AppState;

/// Pull the client key from any accepted envelope:
/// `Authorization: Bearer`, `x-api-key`, `x-goog-api-key`, or `?key=`.
#[must_use]
pub fn extract_api_key(headers: &HeaderMap, query: Option<&str>) -> String {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let key = auth.strip_prefix("Bearer ").unwrap_or(auth);
        if !key.is_empty() {
            return key.to_string();
        }
    }
    for header in ["x-api-key", "x-goog-api-key"] {
        if let Some(key) = headers.get(header).and_then(|v| v.to_str().ok()) {
            if !key.is_empty() {
                return key.to_string();
            }
        }
    }
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("key=") {
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
    }
    String::new()
}

/// API-key gate for the dialect routes. An empty configured key
/// disables authentication.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let expected = &state.config.api_key;
    if expected.is_empty() {
        return next.run(request).await;
    }

    let provided = extract_api_key(request.headers(), request.uri().query());
    if &provided != expected {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": {
                    "message": "Invalid API Key",
                    "type": "invalid_request_error"
                }
            })),
        )
            .into_response();
    }

    next.run(request).await
}

/// Pull the panel session token from the `x-session-token` header or
/// the `skyhook_session` cookie.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> String {
    if let Some(token) = headers.get("x-session-token").and_then(|v| v.to_str().ok()) {
        if !token.is_empty() {
            return token.to_string();
        }
    }
    if let Some(cookies) = headers.get("cookie").and_then(|v| v.to_str().ok()) {
        for cookie in cookies.split(';') {
            if let Some(value) = cookie.trim().strip_prefix("skyhook_session=") {
                return value.to_string();
            }
        }
    }
    String::new()
}

/// Session gate for the admin routes.
pub async fn require_panel_session(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());
    if !state.sessions.validate(&token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response();
    }
    next.run(request).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
