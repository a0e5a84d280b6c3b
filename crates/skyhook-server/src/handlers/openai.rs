//! OpenAI dialect pipeline: `/v1/models`, `/v1/chat/completions`, the
//! credential-pinned variant, and bypass streaming.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, Path, State};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use skyhook_core::ids;
use skyhook_core::models::{is_bypass_model, resolve_model_name, SUPPORTED_MODELS};
use skyhook_core::types::{ToolCallInfo, Usage};
use skyhook_openai::types::ModelsResponse;
use skyhook_openai::{
    build_antigravity_request, encode, map_finish_reason, parse_args, to_chat_completion,
    ChatRequest, ChunkEmitter, RequestScope, DONE_FRAME,
};
use skyhook_upstream::credentials::Credential;
use skyhook_upstream::sse::sse_data_lines;
use skyhook_upstream::stream::{StreamChunk, StreamCollector};

use crate::handlers::common::{
    acquire_credential, dialect_error, maybe_disable_credential, record_log, sse_response,
    CredentialScope, LogParams,
};
use crate::state::AppState;

/// `GET /v1/models`.
pub async fn models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        object: "list",
        data: SUPPORTED_MODELS.to_vec(),
    })
}

/// `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    handle(state, None, uri.path().to_string(), body).await
}

/// `POST /{credential}/v1/chat/completions` — pinned to an email or
/// project ID.
pub async fn chat_completions_pinned(
    State(state): State<AppState>,
    Path(credential): Path<String>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    handle(state, Some(credential), uri.path().to_string(), body).await
}

async fn handle(state: AppState, pin: Option<String>, path: String, body: Bytes) -> Response {
    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => return dialect_error(400, &format!("Invalid request: {err}")),
    };

    let credential = match acquire_credential(&state.pool, pin.as_deref()).await {
        Ok(credential) => credential,
        Err(err) => return dialect_error(err.status(), &err.to_string()),
    };

    if req.stream {
        if is_bypass_model(&req.model) {
            bypass_stream(state, req, path, credential).await
        } else {
            stream_request(state, req, path, credential).await
        }
    } else {
        non_stream_request(state, req, path, credential).await
    }
}

async fn non_stream_request(
    state: AppState,
    req: ChatRequest,
    path: String,
    credential: Credential,
) -> Response {
    let started = Instant::now();
    let scope = CredentialScope::resolve(&credential, &state);
    let upstream_req = build_antigravity_request(
        &req,
        &RequestScope {
            project: scope.project,
            session_id: scope.session_id,
            user_agent: scope.user_agent,
        },
    );

    match state.client.generate_content(&upstream_req, &credential).await {
        Ok(upstream) => {
            let completion = to_chat_completion(&upstream, &req.model);
            let output = completion
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .unwrap_or_default();
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
            Json(completion).into_response()
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
            dialect_error(err.status(), &err.to_string())
        }
    }
}

/// In-band SSE error tail: an error frame, then `[DONE]`.
fn sse_error_body(message: &str) -> Body {
    let frame = format!(
        "data: {}\n\n{DONE_FRAME}",
        serde_json::json!({
            "error": {"message": message, "type": "server_error"}
        })
    );
    Body::from(frame)
}

async fn stream_request(
    state: AppState,
    req: ChatRequest,
    path: String,
    credential: Credential,
) -> Response {
    let started = Instant::now();
    let scope = CredentialScope::resolve(&credential, &state);
    let upstream_req = build_antigravity_request(
        &req,
        &RequestScope {
            project: scope.project,
            session_id: scope.session_id,
            user_agent: scope.user_agent,
        },
    );

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
            return sse_response(sse_error_body(&err.to_string()));
        }
    };

    let id = ids::chat_completion_id();
    let created = chrono::Utc::now().timestamp();
    let model = req.model.clone();
    let logs = Arc::clone(&state.logs);
    let request_snapshot = serde_json::to_value(&req).ok();

    let body_stream = async_stream::stream! {
        let mut emitter = ChunkEmitter::new(id, created, model.as_str());
        let mut collector = StreamCollector::new();
        let mut lines = Box::pin(sse_data_lines(upstream.bytes_stream()));

        while let Some(line) = lines.next().await {
            let Ok(raw) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            let Ok(chunk) = serde_json::from_value::<StreamChunk>(raw.clone()) else {
                continue;
            };
            collector.ingest(&chunk, &raw);

            for part in chunk.parts() {
                for out in emitter.process_part(part) {
                    yield Ok::<Bytes, Infallible>(Bytes::from(encode(&out)));
                }
            }
            if chunk.finish_reason().is_some() {
                for out in emitter.flush_tool_calls() {
                    yield Ok(Bytes::from(encode(&out)));
                }
            }
        }

        let result = collector.finish();
        let reason = map_finish_reason(
            result.finish_reason.as_deref(),
            !result.tool_calls.is_empty(),
        );
        let usage = result.usage.map(Usage::from);
        for out in emitter.finish(reason, usage) {
            yield Ok(Bytes::from(encode(&out)));
        }
        yield Ok(Bytes::from(DONE_FRAME));

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

/// Bypass streaming: the client asked for a stream, but the model's
/// policy demands one atomic upstream exchange. A heartbeat task keeps
/// the client's timer alive while the non-stream call runs; the answer
/// is then replayed as reasoning → tool calls → content deltas.
async fn bypass_stream(
    state: AppState,
    req: ChatRequest,
    path: String,
    credential: Credential,
) -> Response {
    let id = ids::chat_completion_id();
    let created = chrono::Utc::now().timestamp();
    let model = req.model.clone();

    let emitter = Arc::new(Mutex::new(ChunkEmitter::new(id, created, model.clone())));
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(32);
    let cancel = CancellationToken::new();

    // Immediate heartbeat so the client's timer starts right away,
    // then one per second until the upstream answers.
    let _ = send_chunks(&tx, heartbeat_frames(&emitter)).await;
    {
        let emitter = Arc::clone(&emitter);
        let tx = tx.clone();
        let cancel = cancel.clone();
        let _ = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately and would duplicate the
            // heartbeat already sent.
            let _ = interval.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if !send_chunks(&tx, heartbeat_frames(&emitter)).await {
                            break;
                        }
                    }
                }
            }
        });
    }

    {
        let state = state.clone();
        let cancel = cancel.clone();
        let _ = tokio::spawn(async move {
            let started = Instant::now();

            // Upstream sees the real model, not the bypass alias.
            let mut resolved = req.clone();
            resolved.model = resolve_model_name(&req.model).to_string();

            let scope = CredentialScope::resolve(&credential, &state);
            let upstream_req = build_antigravity_request(
                &resolved,
                &RequestScope {
                    project: scope.project,
                    session_id: scope.session_id,
                    user_agent: scope.user_agent,
                },
            );

            let outcome = state.client.generate_content(&upstream_req, &credential).await;
            cancel.cancel();

            match outcome {
                Ok(upstream) => {
                    let completion = to_chat_completion(&upstream, &model);
                    let mut output = String::new();
                    let frames = {
                        let mut guard = emitter.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        let mut chunks = Vec::new();
                        if let Some(choice) = completion.choices.first() {
                            let message = &choice.message;
                            if !message.reasoning.is_empty() {
                                chunks.extend(guard.write_reasoning(message.reasoning.as_bytes()));
                            }
                            if !message.tool_calls.is_empty() {
                                let calls: Vec<ToolCallInfo> = message
                                    .tool_calls
                                    .iter()
                                    .map(|tc| ToolCallInfo {
                                        id: tc.id.clone(),
                                        name: tc.function.name.clone(),
                                        args: parse_args(&tc.function.arguments),
                                        thought_signature: tc
                                            .thought_signature()
                                            .map(String::from),
                                    })
                                    .collect();
                                chunks.extend(guard.write_tool_calls(calls));
                            }
                            if !message.content.is_empty() {
                                chunks.extend(guard.write_content(message.content.as_bytes()));
                            }
                            output = message.content.clone();
                            let reason = choice.finish_reason.as_deref().unwrap_or("stop");
                            chunks.extend(guard.finish(reason, completion.usage));
                        } else {
                            chunks.extend(guard.finish("stop", None));
                        }
                        chunks
                    };
                    let _ = send_chunks(&tx, frames).await;
                    let _ = tx.send(Bytes::from(DONE_FRAME)).await;

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
                }
                Err(err) => {
                    maybe_disable_credential(&state.pool, &credential, &err).await;
                    let frames = {
                        let mut guard = emitter.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        let mut chunks =
                            guard.write_content(format!("Error: {err}").as_bytes());
                        chunks.extend(guard.finish("stop", None));
                        chunks
                    };
                    let _ = send_chunks(&tx, frames).await;
                    let _ = tx.send(Bytes::from(DONE_FRAME)).await;
                    error!(%err, "bypass upstream request failed");
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
                }
            }
        });
    }

    let body_stream = tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(Ok::<Bytes, Infallible>);
    sse_response(Body::from_stream(body_stream))
}

fn heartbeat_frames(
    emitter: &Arc<Mutex<ChunkEmitter>>,
) -> Vec<skyhook_openai::ChatCompletionChunk> {
    let mut guard = emitter
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.heartbeat()
}

/// Send frames; `false` when the client is gone.
async fn send_chunks(
    tx: &tokio::sync::mpsc::Sender<Bytes>,
    chunks: Vec<skyhook_openai::ChatCompletionChunk>,
) -> bool {
    for chunk in chunks {
        if tx.send(Bytes::from(encode(&chunk))).await.is_err() {
            warn!("bypass client went away mid-stream");
            return false;
        }
    }
    true
}
