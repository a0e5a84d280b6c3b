//! Gemini dialect pipeline: `/v1beta/models`, the
//! `models/{model}:{action}` routes, and the raw pass-through variants
//! under `/gemini`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, Path, State};
use axum::response::{IntoResponse, Json, Response};
use bytes::BytesMut;
use futures::StreamExt;
use tracing::warn;

use skyhook_gemini::types::GeminiModelsResponse;
use skyhook_gemini::{
    build_antigravity_request, extract_gemini_response, gemini_model_catalog,
    transform_stream_line, GeminiRequest, RequestScope,
};
use skyhook_upstream::credentials::Credential;
use skyhook_upstream::stream::{StreamChunk, StreamCollector};

use crate::handlers::common::{
    acquire_credential, dialect_error, maybe_disable_credential, record_log, sse_response,
    CredentialScope, LogParams,
};
use crate::state::AppState;

/// `GET /v1beta/models`.
pub async fn models() -> Json<GeminiModelsResponse> {
    Json(gemini_model_catalog())
}

/// Split `gemini-3-pro-high:streamGenerateContent` into model + action.
#[must_use]
pub fn parse_model_action(rest: &str) -> Option<(&str, &str)> {
    let (model, action) = rest.rsplit_once(':')?;
    if model.is_empty() {
        return None;
    }
    Some((model, action))
}

/// `POST /v1beta/models/{model}:{action}` — first-party dialect.
pub async fn api(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    dispatch(state, &rest, uri.path().to_string(), body, false).await
}

/// `POST /gemini/v1beta/models/{model}:{action}` — raw pass-through.
pub async fn raw_api(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    dispatch(state, &rest, uri.path().to_string(), body, true).await
}

async fn dispatch(state: AppState, rest: &str, path: String, body: Bytes, raw: bool) -> Response {
    let Some((model, action)) = parse_model_action(rest) else {
        return dialect_error(400, "Invalid path format");
    };

    let req: GeminiRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => return dialect_error(400, &format!("Invalid request: {err}")),
    };

    let credential = match acquire_credential(&state.pool, None).await {
        Ok(credential) => credential,
        Err(err) => return dialect_error(err.status(), &err.to_string()),
    };

    match action {
        "generateContent" => {
            generate_content(state, model, req, path, credential, raw).await
        }
        "streamGenerateContent" => {
            stream_generate_content(state, model, req, path, credential, raw).await
        }
        other => dialect_error(400, &format!("Unknown action: {other}")),
    }
}

fn scope_for(state: &AppState, credential: &Credential) -> RequestScope {
    let scope = CredentialScope::resolve(credential, state);
    RequestScope {
        project: scope.project,
        session_id: scope.session_id,
        user_agent: scope.user_agent,
    }
}

async fn generate_content(
    state: AppState,
    model: &str,
    req: GeminiRequest,
    path: String,
    credential: Credential,
    raw: bool,
) -> Response {
    let started = Instant::now();
    let upstream_req = build_antigravity_request(model, &req, &scope_for(&state, &credential));

    match state.client.generate_content(&upstream_req, &credential).await {
        Ok(upstream) => {
            record_log(
                &state.logs,
                &LogParams {
                    method: "POST",
                    path: &path,
                    model,
                    status: 200,
                    success: true,
                    duration_ms: started.elapsed().as_millis() as i64,
                    message: "",
                    request_body: serde_json::to_value(&req).ok(),
                    model_output: "",
                    credential: Some(&credential),
                },
            );
            if raw {
                // Pass-through keeps the Antigravity envelope.
                Json(upstream).into_response()
            } else {
                Json(extract_gemini_response(&upstream)).into_response()
            }
        }
        Err(err) => {
            maybe_disable_credential(&state.pool, &credential, &err).await;
            record_log(
                &state.logs,
                &LogParams {
                    method: "POST",
                    path: &path,
                    model,
                    status: err.status(),
                    success: false,
                    duration_ms: started.elapsed().as_millis() as i64,
                    message: &err.to_string(),
                    request_body: serde_json::to_value(&req).ok(),
                    model_output: "",
                    credential: Some(&credential),
                },
            );
            dialect_error(err.status(), &err.to_string())
        }
    }
}

async fn stream_generate_content(
    state: AppState,
    model: &str,
    req: GeminiRequest,
    path: String,
    credential: Credential,
    raw: bool,
) -> Response {
    let started = Instant::now();
    let upstream_req = build_antigravity_request(model, &req, &scope_for(&state, &credential));

    let upstream = match state
        .client
        .generate_content_stream(&upstream_req, &credential)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            maybe_disable_credential(&state.pool, &credential, &err).await;
            return dialect_error(err.status(), &err.to_string());
        }
    };

    let model = model.to_string();
    let logs = Arc::clone(&state.logs);
    let request_snapshot = serde_json::to_value(&req).ok();

    let body_stream = async_stream::stream! {
        let mut collector = StreamCollector::new();
        let mut byte_stream = upstream.bytes_stream();
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            let line = loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line = buffer.split_to(pos + 1);
                    line.truncate(line.len() - 1);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    break Some(line.freeze());
                }
                match byte_stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(err)) => {
                        warn!(%err, "gemini stream read error");
                        break None;
                    }
                    None => {
                        if buffer.is_empty() {
                            break None;
                        }
                        let line = buffer.split_to(buffer.len());
                        break Some(line.freeze());
                    }
                }
            };
            let Some(line) = line else { break };

            let text = String::from_utf8_lossy(&line).into_owned();
            if let Some(payload) = text.strip_prefix("data: ") {
                if payload != "[DONE]" {
                    if let Ok(raw_value) = serde_json::from_str::<serde_json::Value>(payload) {
                        if let Ok(chunk) = serde_json::from_value::<StreamChunk>(raw_value.clone())
                        {
                            collector.ingest(&chunk, &raw_value);
                        }
                    }
                }
                if raw {
                    yield Ok::<Bytes, Infallible>(Bytes::from(format!("{text}\n")));
                } else {
                    let transformed = transform_stream_line(&text);
                    yield Ok(Bytes::from(format!("{transformed}\n\n")));
                }
            } else if raw {
                // The pass-through route echoes every line verbatim.
                yield Ok(Bytes::from(format!("{text}\n")));
            }
        }

        let result = collector.finish();
        record_log(
            &logs,
            &LogParams {
                method: "POST",
                path: &path,
                model: &model,
                status: 200,
                success: true,
                duration_ms: started.elapsed().as_millis() as i64,
                message: "",
                request_body: request_snapshot,
                model_output: &result.text,
                credential: Some(&credential),
            },
        );
    };

    sse_response(Body::from_stream(body_stream))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_action_parsing() {
        assert_eq!(
            parse_model_action("gemini-3-pro-high:generateContent"),
            Some(("gemini-3-pro-high", "generateContent"))
        );
        assert_eq!(
            parse_model_action("gemini-3-pro-low:streamGenerateContent"),
            Some(("gemini-3-pro-low", "streamGenerateContent"))
        );
        assert_eq!(parse_model_action("no-colon"), None);
        assert_eq!(parse_model_action(":generateContent"), None);
    }
}
