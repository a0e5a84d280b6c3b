//! Admin JSON API: panel login, account management, endpoint mode,
//! request logs, and the OAuth account-import flow.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use skyhook_core::ids;
use skyhook_upstream::credentials::{Credential, ImportedCredential};
use skyhook_upstream::endpoints::ENDPOINTS;
use skyhook_upstream::oauth;

use crate::middleware::extract_session_token;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Panel sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Panel user name.
    #[serde(default)]
    pub username: String,
    /// Panel password.
    pub password: String,
}

/// `POST /admin/login`.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let user_ok = req.username.is_empty() || req.username == state.config.panel_user;
    if !user_ok || req.password != state.config.panel_password {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid credentials"})),
        )
            .into_response();
    }

    let token = state.sessions.create();
    let cookie = format!("skyhook_session={token}; Path=/; HttpOnly; SameSite=Lax");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({"token": token})),
    )
        .into_response()
}

/// `POST /admin/logout`.
pub async fn logout(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Response {
    let token = extract_session_token(&headers);
    state.sessions.revoke(&token);
    Json(json!({"ok": true})).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /admin/endpoints`.
pub async fn get_endpoints(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "mode": state.selector.mode().await,
        "endpoints": ENDPOINTS,
    }))
}

#[derive(Deserialize)]
pub struct SetModeRequest {
    /// The requested mode string.
    pub mode: String,
}

/// `POST /admin/endpoints/mode`.
pub async fn set_endpoint_mode(
    State(state): State<AppState>,
    Json(req): Json<SetModeRequest>,
) -> Json<serde_json::Value> {
    state.selector.set_mode(&req.mode).await;
    Json(json!({"mode": state.selector.mode().await}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Logs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LogsQuery {
    /// Max entries to return (0 = all retained).
    #[serde(default)]
    pub limit: usize,
}

/// `GET /admin/logs`.
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<serde_json::Value> {
    Json(json!({"logs": state.logs.list(query.limit)}))
}

/// `GET /admin/logs/{id}`.
pub async fn get_log_detail(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.logs.get(&id) {
        Some(entry) => Json(entry).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "log not found"})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct UsageQuery {
    /// Trailing window in minutes.
    #[serde(default = "default_usage_window")]
    pub window: i64,
}

fn default_usage_window() -> i64 {
    60
}

/// `GET /admin/logs/usage`.
pub async fn get_logs_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Json<serde_json::Value> {
    Json(json!({"usage": state.logs.usage(query.window)}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /auth/accounts` — access tokens are never exposed.
pub async fn get_accounts(State(state): State<AppState>) -> Json<serde_json::Value> {
    let accounts: Vec<serde_json::Value> = state
        .pool
        .snapshot()
        .await
        .iter()
        .map(|c| {
            json!({
                "email": c.email,
                "projectId": c.project_id,
                "enable": c.enabled,
                "expires_in": c.expires_in,
                "timestamp": c.issued_at_ms,
                "created_at": c.created_at,
            })
        })
        .collect();
    Json(json!(accounts))
}

#[derive(Deserialize)]
pub struct ImportTomlRequest {
    /// TOML document with an `accounts` array.
    pub toml: String,
    /// Clear the pool before importing (clean re-import).
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Deserialize)]
struct TomlAccounts {
    #[serde(default)]
    accounts: Vec<ImportedCredential>,
}

/// `POST /auth/accounts/import-toml`.
pub async fn import_toml(
    State(state): State<AppState>,
    Json(req): Json<ImportTomlRequest>,
) -> Response {
    let parsed: TomlAccounts = match toml::from_str(&req.toml) {
        Ok(parsed) => parsed,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid TOML: {err}")})),
            )
                .into_response()
        }
    };
    // Clear only after the document parsed, so a bad upload cannot
    // wipe the store.
    if req.replace_existing {
        state.pool.clear().await;
    }
    let imported = state.pool.import(parsed.accounts).await;
    Json(json!({"imported": imported})).into_response()
}

/// `POST /auth/accounts/{index}/enable`.
#[derive(Deserialize)]
pub struct EnableRequest {
    /// Desired enabled state.
    pub enable: bool,
}

/// Toggle one credential.
pub async fn toggle_account(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(req): Json<EnableRequest>,
) -> Response {
    match state.pool.set_enabled(index, req.enable).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

/// `DELETE /auth/accounts/{index}`.
pub async fn delete_account(State(state): State<AppState>, Path(index): Path<usize>) -> Response {
    match state.pool.delete(index).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

/// `POST /auth/accounts/{index}/refresh`.
pub async fn refresh_account(State(state): State<AppState>, Path(index): Path<usize>) -> Response {
    match state.pool.refresh_at(index).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

/// `POST /auth/accounts/refresh-all`.
pub async fn refresh_all_accounts(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (success, failed) = state.pool.refresh_all().await;
    Json(json!({"success": success, "failed": failed}))
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuth account import
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct OAuthUrlQuery {
    /// Redirect URI the browser returns to.
    pub redirect_uri: String,
}

/// `GET /auth/oauth/url`.
pub async fn oauth_url(
    State(state): State<AppState>,
    Query(query): Query<OAuthUrlQuery>,
) -> Json<serde_json::Value> {
    let oauth_state = ids::secure_token();
    let url = oauth::build_auth_url(&state.oauth, &query.redirect_uri, &oauth_state);
    Json(json!({"url": url, "state": oauth_state}))
}

#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    /// Authorization code.
    #[serde(default)]
    pub code: String,
    /// Redirect URI used for the exchange.
    #[serde(default)]
    pub redirect_uri: String,
}

/// `GET /oauth-callback` — exchange the code and store the credential.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    if query.code.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing code"})),
        )
            .into_response();
    }
    match import_from_code(&state, &query.code, &query.redirect_uri).await {
        Ok(email) => Json(json!({"ok": true, "email": email})).into_response(),
        Err(err) => {
            warn!(%err, "oauth exchange failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ParseOAuthUrlRequest {
    /// The pasted redirect URL.
    pub url: String,
    /// Redirect URI used for the exchange.
    #[serde(default)]
    pub redirect_uri: String,
}

/// `POST /auth/oauth/parse-url` — manual import of a pasted redirect.
pub async fn parse_oauth_url(
    State(state): State<AppState>,
    Json(req): Json<ParseOAuthUrlRequest>,
) -> Response {
    let (code, _state) = match oauth::parse_oauth_redirect(&req.url) {
        Ok(parts) => parts,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    };
    match import_from_code(&state, &code, &req.redirect_uri).await {
        Ok(email) => Json(json!({"ok": true, "email": email})).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

async fn import_from_code(
    state: &AppState,
    code: &str,
    redirect_uri: &str,
) -> Result<String, skyhook_upstream::error::UpstreamError> {
    let tokens = oauth::exchange_code(&state.http, &state.oauth, code, redirect_uri).await?;
    let email = oauth::fetch_user_info(&state.http, &state.oauth, &tokens.access_token)
        .await
        .map(|info| info.email)
        .unwrap_or_default();

    state
        .pool
        .add(Credential {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.unwrap_or_default(),
            expires_in: tokens.expires_in,
            issued_at_ms: chrono::Utc::now().timestamp_millis(),
            project_id: String::new(),
            email: email.clone(),
            enabled: true,
            created_at: chrono::Utc::now(),
            session_id: String::new(),
        })
        .await;
    Ok(email)
}
