//! Claude dialect pipeline: `/v1/messages` and
//! `/v1/messages/count_tokens`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, State};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;

use skyhook_claude::types::ErrorResponse;
use skyhook_claude::{
    build_antigravity_request, count_tokens, to_messages_response, MessageStream, MessagesRequest,
    RequestScope,
};
use skyhook_core::types::Usage;
use skyhook_upstream::credentials::Credential;
use skyhook_upstream::sse::sse_data_lines;
use skyhook_upstream::stream::{StreamChunk, StreamCollector};

use crate::handlers::common::{
    acquire_credential, claude_error, maybe_disable_credential, record_log, sse_response,
    CredentialScope, LogParams,
};
use crate::state::AppState;

/// `POST /v1/messages/count_tokens` — heuristic estimate.
pub async fn count_tokens_endpoint(body: Bytes) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            return claude_error(400, "invalid_request_error", &format!("Invalid request: {err}"))
        }
    };
    match count_tokens(&req) {
        Ok(result) => Json(result).into_response(),
        Err(err) => claude_error(400, "invalid_request_error", &err.to_string()),
    }
}

/// `POST /v1/messages`.
pub async fn messages(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            return claude_error(400, "invalid_request_error", &format!("Invalid request: {err}"))
        }
    };

    let credential = match acquire_credential(&state.pool, None).await {
        Ok(credential) => credential,
        Err(err) => return claude_error(err.status(), "api_error", &err.to_string()),
    };

    let path = uri.path().to_string();
    if req.stream {
        stream_request(state, req, path, credential).await
    } else {
        non_stream_request(state, req, path, credential).await
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

async fn non_stream_request(
    state: AppState,
    req: MessagesRequest,
    path: String,
    credential: Credential,
) -> Response {
    let started = Instant::now();
    let input_tokens = count_tokens(&req).map(|t| t.input_tokens).unwrap_or(0);

    let upstream_req = match build_antigravity_request(&req, &scope_for(&state, &credential)) {
        Ok(upstream_req) => upstream_req,
        Err(err) => return claude_error(400, "invalid_request_error", &err.to_string()),
    };
    let request_id = upstream_req.request_id.clone();

    match state.client.generate_content(&upstream_req, &credential).await {
        Ok(upstream) => {
            let response = to_messages_response(&upstream, &request_id, &req.model, input_tokens);
            let output = response
                .content
                .iter()
                .filter_map(|block| match block {
                    skyhook_claude::ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<String>();
            record_log(
                &state.logs,
                &LogParams {
                    method: "POST",
                    path: &path,
                    model: &req.model,
                    status: 200,
                    success: true,
                    duration_ms: started.elapsed().as_millis() as i64,
                    message: "",
                    request_body: serde_json::to_value(&req).ok(),
                    model_output: &output,
                    credential: Some(&credential),
                },
            );
            Json(response).into_response()
        }
        Err(err) => {
            maybe_disable_credential(&state.pool, &credential, &err).await;
            record_log(
                &state.logs,
                &LogParams {
                    method: "POST",
                    path: &path,
                    model: &req.model,
                    status: err.status(),
                    success: false,
                    duration_ms: started.elapsed().as_millis() as i64,
                    message: &err.to_string(),
                    request_body: serde_json::to_value(&req).ok(),
                    model_output: "",
                    credential: Some(&credential),
                },
            );
            claude_error(err.status(), "api_error", &err.to_string())
        }
    }
}

/// In-band Claude error frame for a stream that failed before any
/// upstream bytes arrived.
fn stream_error_body(message: &str) -> Body {
    let payload = serde_json::to_string(&ErrorResponse::new("api_error", message))
        .unwrap_or_else(|_| "{}".into());
    Body::from(format!("event: error\ndata: {payload}\n\n"))
}

async fn stream_request(
    state: AppState,
    req: MessagesRequest,
    path: String,
    credential: Credential,
) -> Response {
    let started = Instant::now();
    let input_tokens = count_tokens(&req).map(|t| t.input_tokens).unwrap_or(0);

    let upstream_req = match build_antigravity_request(&req, &scope_for(&state, &credential)) {
        Ok(upstream_req) => upstream_req,
        Err(err) => return claude_error(400, "invalid_request_error", &err.to_string()),
    };
    let request_id = upstream_req.request_id.clone();

    let upstream = match state
        .client
        .generate_content_stream(&upstream_req, &credential)
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            maybe_disable_credential(&state.pool, &credential, &err).await;
            record_log(
                &state.logs,
                &LogParams {
                    method: "POST",
                    path: &path,
                    model: &req.model,
                    status: err.status(),
                    success: false,
                    duration_ms: started.elapsed().as_millis() as i64,
                    message: &err.to_string(),
                    request_body: serde_json::to_value(&req).ok(),
                    model_output: "",
                    credential: Some(&credential),
                },
            );
            return sse_response(stream_error_body(&err.to_string()));
        }
    };

    let model = req.model.clone();
    let logs = Arc::clone(&state.logs);
    let request_snapshot = serde_json::to_value(&req).ok();

    let body_stream = async_stream::stream! {
        let mut emitter = MessageStream::new(request_id, model.as_str(), input_tokens);
        let mut collector = StreamCollector::new();
        let mut lines = Box::pin(sse_data_lines(upstream.bytes_stream()));

        yield Ok::<Bytes, Infallible>(Bytes::from(emitter.start().encode()));

        while let Some(line) = lines.next().await {
            let Ok(raw) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            let Ok(chunk) = serde_json::from_value::<StreamChunk>(raw.clone()) else {
                continue;
            };
            collector.ingest(&chunk, &raw);

            // Signatures may ride any part of the chunk and arrive
            // after their thinking text; capture them all first.
            for part in chunk.parts() {
                if let Some(sig) = part.thought_signature.as_deref() {
                    emitter.set_signature(sig);
                }
            }
            for part in chunk.parts() {
                for event in emitter.process_part(part) {
                    yield Ok(Bytes::from(event.encode()));
                }
            }
        }

        let result = collector.finish();
        let usage = result.usage.map(Usage::from);
        for event in emitter.finish(usage) {
            yield Ok(Bytes::from(event.encode()));
        }

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
