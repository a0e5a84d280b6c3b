//! Route table and middleware stack.

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, claude, common, gemini, openai};
use crate::middleware::{require_api_key, require_panel_session};
use crate::state::AppState;

/// Request body cap (the dialects carry base64 images).
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Assemble the full router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    // Dialect surface, gated by the client API key.
    let api = Router::new()
        .route("/v1/models", get(openai::models))
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route(
            "/:credential/v1/chat/completions",
            post(openai::chat_completions_pinned),
        )
        .route("/v1/messages", post(claude::messages))
        .route(
            "/v1/messages/count_tokens",
            post(claude::count_tokens_endpoint),
        )
        .route("/v1beta/models", get(gemini::models))
        .route("/v1beta/models/*rest", post(gemini::api))
        .route("/gemini/v1beta/models/*rest", post(gemini::raw_api))
        .layer(from_fn_with_state(state.clone(), require_api_key));

    // Admin surface, gated by a panel session.
    let panel = Router::new()
        .route("/admin/endpoints", get(admin::get_endpoints))
        .route("/admin/endpoints/mode", post(admin::set_endpoint_mode))
        .route("/admin/logs", get(admin::get_logs))
        .route("/admin/logs/usage", get(admin::get_logs_usage))
        .route("/admin/logs/:id", get(admin::get_log_detail))
        .route("/auth/accounts", get(admin::get_accounts))
        .route("/auth/accounts/import-toml", post(admin::import_toml))
        .route("/auth/accounts/refresh-all", post(admin::refresh_all_accounts))
        .route("/auth/accounts/:index/refresh", post(admin::refresh_account))
        .route("/auth/accounts/:index/enable", post(admin::toggle_account))
        .route("/auth/accounts/:index", delete(admin::delete_account))
        .route("/auth/oauth/url", get(admin::oauth_url))
        .route("/auth/oauth/parse-url", post(admin::parse_oauth_url))
        .layer(from_fn_with_state(state.clone(), require_panel_session));

    Router::new()
        .route("/healthz", get(common::health))
        .route("/health", get(common::health))
        .route("/admin/login", post(admin::login))
        .route("/admin/logout", post(admin::logout))
        .route("/oauth-callback", get(admin::oauth_callback))
        .merge(api)
        .merge(panel)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::from_config(Config {
            data_dir: std::env::temp_dir().join(format!(
                "skyhook-test-{}",
                skyhook_core::ids::secure_token()
            )),
            panel_password: "hunter2".into(),
            ..Config::default()
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        for path in ["/healthz", "/health"] {
            let app = build_router(test_state());
            let response = app
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["status"], "ok");
        }
    }

    #[tokio::test]
    async fn models_catalog_without_api_key() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["object"], "list");
        assert!(json["data"].as_array().unwrap().len() >= 5);
    }

    #[tokio::test]
    async fn api_key_enforced_when_configured() {
        let state = AppState::from_config(Config {
            api_key: "sk-secret".into(),
            panel_password: "hunter2".into(),
            data_dir: std::env::temp_dir().join(format!(
                "skyhook-test-{}",
                skyhook_core::ids::secure_token()
            )),
            ..Config::default()
        });

        let app = build_router(state.clone());
        let denied = app
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let app = build_router(state);
        let allowed = app
            .oneshot(
                Request::get("/v1/models")
                    .header("x-api-key", "sk-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_completions_rejects_bad_body() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn chat_completions_without_credentials_is_503() {
        let app = build_router(test_state());
        let body = serde_json::json!({
            "model": "gemini-3-pro-low",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let response = app
            .oneshot(
                Request::post("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn claude_messages_error_envelope() {
        let app = build_router(test_state());
        let body = serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "hi"}]
        });
        let response = app
            .oneshot(
                Request::post("/v1/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["type"], "api_error");
    }

    #[tokio::test]
    async fn count_tokens_works_without_credentials() {
        let app = build_router(test_state());
        let body = serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "hello world, a longer sentence"}]
        });
        let response = app
            .oneshot(
                Request::post("/v1/messages/count_tokens")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["input_tokens"].as_u64().unwrap() > 0);
        assert_eq!(json["input_tokens"], json["token_count"]);
    }

    #[tokio::test]
    async fn gemini_models_catalog() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/v1beta/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["models"][0]["name"]
            .as_str()
            .unwrap()
            .starts_with("models/"));
    }

    #[tokio::test]
    async fn admin_requires_session() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/admin/logs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_then_admin_access() {
        let state = test_state();

        let app = build_router(state.clone());
        let login = app
            .oneshot(
                Request::post("/admin/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"password": "hunter2"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(login.status(), StatusCode::OK);
        let token = body_json(login).await["token"].as_str().unwrap().to_string();

        let app = build_router(state);
        let logs = app
            .oneshot(
                Request::get("/admin/logs")
                    .header("x-session-token", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(logs.status(), StatusCode::OK);
    }

    /// Log in and return a panel session token.
    async fn login_token(state: &AppState) -> String {
        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::post("/admin/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"password": "hunter2"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// One authenticated admin request; returns status + decoded body.
    async fn admin_request(
        state: &AppState,
        token: &str,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let app = build_router(state.clone());
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-session-token", token)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    const IMPORT_TOML: &str = r#"
[[accounts]]
access_token = "at-1"
refresh_token = "rt-1"
expires_in = 3599
timestamp = 1700000000000
projectId = "proj-1"
email = "a@x.com"

[[accounts]]
refresh_token = "rt-2"
email = "b@x.com"
"#;

    #[tokio::test]
    async fn admin_accounts_lifecycle() {
        let state = test_state();
        let token = login_token(&state).await;

        // Empty pool lists as an empty array.
        let (status, json) =
            admin_request(&state, &token, "GET", "/auth/accounts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));

        // TOML bulk import.
        let (status, json) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/import-toml",
            Some(serde_json::json!({"toml": IMPORT_TOML})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["imported"], 2);

        // The listing shows both, without ever exposing tokens.
        let (_, json) = admin_request(&state, &token, "GET", "/auth/accounts", None).await;
        let accounts = json.as_array().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0]["email"], "a@x.com");
        assert_eq!(accounts[0]["projectId"], "proj-1");
        assert_eq!(accounts[0]["enable"], true);
        assert!(accounts[0].get("access_token").is_none());
        assert!(accounts[0].get("refresh_token").is_none());

        // Disable one.
        let (status, json) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/0/enable",
            Some(serde_json::json!({"enable": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        let (_, json) = admin_request(&state, &token, "GET", "/auth/accounts", None).await;
        assert_eq!(json[0]["enable"], false);

        // Delete the other.
        let (status, json) =
            admin_request(&state, &token, "DELETE", "/auth/accounts/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        let (_, json) = admin_request(&state, &token, "GET", "/auth/accounts", None).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        // Out-of-range indices report not-found.
        let (status, _) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/9/enable",
            Some(serde_json::json!({"enable": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            admin_request(&state, &token, "DELETE", "/auth/accounts/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_import_toml_rejects_bad_document() {
        let state = test_state();
        let token = login_token(&state).await;

        let (status, json) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/import-toml",
            Some(serde_json::json!({"toml": "not [ valid toml"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("invalid TOML"));
        assert!(state.pool.is_empty().await);
    }

    #[tokio::test]
    async fn admin_import_toml_replace_existing_clears_pool() {
        let state = test_state();
        let token = login_token(&state).await;

        let (_, json) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/import-toml",
            Some(serde_json::json!({"toml": IMPORT_TOML})),
        )
        .await;
        assert_eq!(json["imported"], 2);

        let replacement = r#"
[[accounts]]
refresh_token = "rt-3"
email = "c@x.com"
"#;
        let (status, json) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/import-toml",
            Some(serde_json::json!({"toml": replacement, "replace_existing": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["imported"], 1);

        let (_, json) = admin_request(&state, &token, "GET", "/auth/accounts", None).await;
        let accounts = json.as_array().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0]["email"], "c@x.com");

        // A parse failure with the flag set must not wipe the store.
        let (status, _) = admin_request(
            &state,
            &token,
            "POST",
            "/auth/accounts/import-toml",
            Some(serde_json::json!({"toml": "not [ valid", "replace_existing": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.pool.len().await, 1);
    }

    #[tokio::test]
    async fn admin_endpoint_mode_roundtrip() {
        let state = test_state();
        let token = login_token(&state).await;

        let (status, json) =
            admin_request(&state, &token, "GET", "/admin/endpoints", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "daily");
        assert_eq!(json["endpoints"].as_array().unwrap().len(), 3);

        let (status, json) = admin_request(
            &state,
            &token,
            "POST",
            "/admin/endpoints/mode",
            Some(serde_json::json!({"mode": "round-robin-dp"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "round-robin-dp");

        // Unknown modes are ignored, keeping the current one.
        let (_, json) = admin_request(
            &state,
            &token,
            "POST",
            "/admin/endpoints/mode",
            Some(serde_json::json!({"mode": "staging"})),
        )
        .await;
        assert_eq!(json["mode"], "round-robin-dp");
    }

    #[tokio::test]
    async fn admin_log_detail_not_found() {
        let state = test_state();
        let token = login_token(&state).await;

        let (status, _) =
            admin_request(&state, &token, "GET", "/admin/logs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) =
            admin_request(&state, &token, "GET", "/admin/logs/usage", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["usage"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn oauth_url_contains_state_and_scopes() {
        let state = test_state();
        let token = login_token(&state).await;

        let (status, json) = admin_request(
            &state,
            &token,
            "GET",
            "/auth/oauth/url?redirect_uri=http://localhost:8045/cb",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let url = json["url"].as_str().unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("cloud-platform"));
        assert!(!json["state"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn logout_revokes_session() {
        let state = test_state();
        let token = login_token(&state).await;

        let (status, _) =
            admin_request(&state, &token, "POST", "/admin/logout", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = admin_request(&state, &token, "GET", "/admin/logs", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/admin/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"password": "wrong"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn gemini_unknown_action_is_400() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/v1beta/models/gemini-3-pro-low:frobnicate")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        // Credential acquisition happens before action dispatch fails,
        // so an empty pool reports 503 first; with a path missing the
        // colon the shape check fires immediately.
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/v1beta/models/no-colon-here")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
