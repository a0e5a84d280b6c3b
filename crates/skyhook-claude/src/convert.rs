//! Claude ⇄ canonical translation and token estimation.

use std::collections::HashMap;

use serde_json::{Map, Value};

use skyhook_core::ids;
use skyhook_core::models::{resolve_model_name, should_enable_thinking, stop_sequences_with};
use skyhook_core::types::{
    AntigravityRequest, AntigravityResponse, Content, FunctionCall, FunctionDeclaration,
    FunctionResponse, GenerationConfig, InnerRequest, Part, SystemInstruction, Tool, ToolConfig,
};

use crate::schema::sanitize_schema;
use crate::types::{
    ClaudeUsage, ContentBlock, MessagesRequest, MessagesResponse, TokenCountResponse,
};

/// Minimum gap the upstream enforces between the output budget and the
/// thinking budget.
const THINKING_HEADROOM: u32 = 1024;

/// Floor the output budget is bumped to when nothing else fits.
const MIN_OUTPUT_TOKENS: u32 = 2048;

/// Per-request identity resolved from the acquired credential.
#[derive(Clone, Debug)]
pub struct RequestScope {
    /// Upstream project.
    pub project: String,
    /// Credential session affinity token.
    pub session_id: String,
    /// Relay user agent.
    pub user_agent: String,
}

/// Client-request validation failures.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// `max_tokens` missing or non-positive.
    #[error("max_tokens is required and must be positive")]
    MissingMaxTokens,
    /// Empty message list.
    #[error("messages must not be empty")]
    EmptyMessages,
}

/// Rough `len/4` token estimate; non-empty text counts at least one.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let count = text.len() / 4;
    u32::try_from(count.max(1)).unwrap_or(u32::MAX)
}

/// Heuristic input-token count over messages, system, and tool JSON.
pub fn count_tokens(req: &MessagesRequest) -> Result<TokenCountResponse, RequestError> {
    if req.messages.is_empty() {
        return Err(RequestError::EmptyMessages);
    }

    let mut total = String::new();
    for msg in &req.messages {
        total.push_str(&extract_message_text(&msg.content));
        total.push('\n');
    }
    if let Some(ref system) = req.system {
        total.push_str(&extract_system_text(system));
        total.push('\n');
    }
    if !req.tools.is_empty() {
        if let Ok(tools_json) = serde_json::to_string(&req.tools) {
            total.push_str(&tools_json);
        }
    }

    let input_tokens = estimate_tokens(&total);
    Ok(TokenCountResponse {
        input_tokens,
        token_count: input_tokens,
        tokens: input_tokens,
    })
}

/// Build the canonical upstream request from a Claude request.
pub fn build_antigravity_request(
    req: &MessagesRequest,
    scope: &RequestScope,
) -> Result<AntigravityRequest, RequestError> {
    if req.max_tokens == 0 {
        return Err(RequestError::MissingMaxTokens);
    }
    if req.messages.is_empty() {
        return Err(RequestError::EmptyMessages);
    }

    let model = resolve_model_name(&req.model).to_string();

    let mut inner = InnerRequest {
        contents: convert_messages(&req.messages),
        session_id: scope.session_id.clone(),
        ..InnerRequest::default()
    };

    if let Some(ref system) = req.system {
        let text = extract_system_text(system);
        if !text.is_empty() {
            inner.system_instruction = Some(SystemInstruction::from_text(text));
        }
    }

    if !req.tools.is_empty() {
        inner.tools = Some(
            req.tools
                .iter()
                .map(|t| Tool {
                    function_declarations: vec![FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: Some(sanitize_schema(&t.input_schema)),
                    }],
                })
                .collect(),
        );
        inner.tool_config = Some(ToolConfig::auto());
    }

    inner.generation_config = Some(build_generation_config(req, &model));

    Ok(AntigravityRequest {
        project: scope.project.clone(),
        request_id: ids::request_id(),
        request: inner,
        model,
        user_agent: scope.user_agent.clone(),
        request_type: None,
    })
}

/// First pass: map every `tool_use` id to its name, because
/// `tool_result` blocks carry only the id and the upstream requires a
/// name on function responses.
fn build_tool_name_map(messages: &[crate::types::Message]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for msg in messages {
        if msg.role != "assistant" {
            continue;
        }
        let Some(blocks) = msg.content.as_array() else {
            continue;
        };
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                if !id.is_empty() && !name.is_empty() {
                    let _ = map.insert(id.to_string(), name.to_string());
                }
            }
        }
    }
    map
}

fn convert_messages(messages: &[crate::types::Message]) -> Vec<Content> {
    let tool_names = build_tool_name_map(messages);

    let mut contents = Vec::new();
    for msg in messages {
        let role = if msg.role == "assistant" { "model" } else { "user" };
        let parts = convert_content_to_parts(&msg.content, &tool_names);
        if !parts.is_empty() {
            contents.push(Content {
                role: role.into(),
                parts,
            });
        }
    }
    contents
}

fn convert_content_to_parts(
    content: &Value,
    tool_names: &HashMap<String, String>,
) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut signature: Option<String> = None;

    match content {
        Value::String(text) => {
            if !text.is_empty() {
                parts.push(Part::text(text.clone()));
            }
        }
        Value::Array(blocks) => {
            for block in blocks {
                let kind = block.get("type").and_then(Value::as_str).unwrap_or_default();
                match kind {
                    "text" => {
                        let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                        if !text.is_empty() {
                            parts.push(Part::text(text));
                        }
                    }
                    "thinking" => {
                        let thinking = block
                            .get("thinking")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let sig = block
                            .get("signature")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        // First non-empty signature wins.
                        if !sig.is_empty() && signature.is_none() {
                            signature = Some(sig.to_string());
                        }
                        if !thinking.is_empty() {
                            parts.push(Part::thought(thinking));
                        }
                    }
                    "tool_use" => {
                        let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                        let args = block
                            .get("input")
                            .and_then(Value::as_object)
                            .cloned()
                            .unwrap_or_default();
                        parts.push(Part::function_call(FunctionCall {
                            id: id.into(),
                            name: name.into(),
                            args,
                        }));
                    }
                    "tool_result" => {
                        let tool_use_id = block
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let is_error =
                            block.get("is_error").and_then(Value::as_bool).unwrap_or(false);
                        let text = extract_tool_result_text(block.get("content"));
                        let response = decode_tool_result(&text, is_error);
                        let name = tool_names.get(tool_use_id).cloned().unwrap_or_default();
                        parts.push(Part::function_response(FunctionResponse {
                            id: tool_use_id.into(),
                            name,
                            response,
                        }));
                    }
                    // Images are dropped: the upstream carries images via
                    // inlineData which this route does not emit.
                    _ => {}
                }
            }
        }
        _ => {}
    }

    attach_signature(&mut parts, signature);
    parts
}

/// Attach the captured thinking signature to exactly one part:
/// the first function call, else the last non-thought text, else the
/// last thought.
fn attach_signature(parts: &mut [Part], signature: Option<String>) {
    let Some(signature) = signature.filter(|s| !s.is_empty()) else {
        return;
    };

    if let Some(part) = parts.iter_mut().find(|p| p.function_call.is_some()) {
        part.thought_signature = Some(signature);
        return;
    }
    if let Some(part) = parts
        .iter_mut()
        .rev()
        .find(|p| !p.thought && !p.text.is_empty())
    {
        part.thought_signature = Some(signature);
        return;
    }
    if let Some(part) = parts.iter_mut().rev().find(|p| p.thought) {
        part.thought_signature = Some(signature);
    }
}

/// Decode a tool-result body: a JSON object passes through, anything
/// else wraps as `{result: text}` or `{error: text}`.
fn decode_tool_result(text: &str, is_error: bool) -> Map<String, Value> {
    if let Ok(map) = serde_json::from_str::<Map<String, Value>>(text) {
        return map;
    }
    let mut map = Map::new();
    let key = if is_error { "error" } else { "result" };
    let _ = map.insert(key.into(), Value::String(text.to_string()));
    map
}

fn extract_tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|i| i.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|i| i.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn extract_system_text(system: &Value) -> String {
    match system {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn extract_message_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => {
            let mut out = String::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        out.push_str(block.get("text").and_then(Value::as_str).unwrap_or_default());
                    }
                    Some("thinking") => {
                        out.push_str(
                            block
                                .get("thinking")
                                .and_then(Value::as_str)
                                .unwrap_or_default(),
                        );
                    }
                    Some("tool_use") => {
                        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                        let input = block.get("input").cloned().unwrap_or(Value::Null);
                        out.push_str(&format!("{name}{input}"));
                    }
                    Some("tool_result") => {
                        out.push_str(&extract_tool_result_text(block.get("content")));
                    }
                    _ => {}
                }
            }
            out
        }
        _ => String::new(),
    }
}

fn build_generation_config(req: &MessagesRequest, model: &str) -> GenerationConfig {
    let mut config = GenerationConfig {
        candidate_count: Some(1),
        stop_sequences: stop_sequences_with(&req.stop_sequences),
        max_output_tokens: Some(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        ..GenerationConfig::default()
    };

    let requested = req.thinking.as_ref().is_some_and(|t| t.kind == "enabled");
    if requested || should_enable_thinking(model, None) {
        let mut thinking = skyhook_core::models::build_thinking_config(model);
        if let Some(ref directive) = req.thinking {
            if directive.budget.is_some() {
                thinking.thinking_budget = directive.budget;
            }
            if directive.level.is_some() {
                thinking.thinking_level = directive.level.clone();
            }
        }
        if model.starts_with("gemini-3-pro-") {
            thinking.thinking_level = Some("high".into());
            thinking.thinking_budget = None;
        }

        // Upstream constraint: max_output_tokens > thinking_budget + headroom.
        if let Some(budget) = thinking.thinking_budget {
            let max = config.max_output_tokens.unwrap_or(0);
            if max <= budget + THINKING_HEADROOM {
                let reduced = max.saturating_sub(THINKING_HEADROOM + 1);
                if reduced > 0 {
                    thinking.thinking_budget = Some(reduced);
                } else {
                    config.max_output_tokens = Some(MIN_OUTPUT_TOKENS);
                    thinking.thinking_budget =
                        Some(budget.min(MIN_OUTPUT_TOKENS - THINKING_HEADROOM - 1));
                }
            }
        }

        config.thinking_config = Some(thinking);
    }

    config
}

/// Translate a non-streaming upstream response into a Claude response.
#[must_use]
pub fn to_messages_response(
    resp: &AntigravityResponse,
    request_id: &str,
    model: &str,
    input_tokens: u32,
) -> MessagesResponse {
    let parts: &[Part] = resp
        .response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map_or(&[], |c| c.parts.as_slice());

    let mut thinking = String::new();
    let mut text = String::new();
    let mut signature = String::new();
    let mut tool_blocks = Vec::new();

    for part in parts {
        if let Some(sig) = part.thought_signature.as_deref() {
            if !sig.is_empty() {
                signature = sig.to_string();
            }
        }
        if part.thought {
            thinking.push_str(&part.text);
        } else if !part.text.is_empty() {
            text.push_str(&part.text);
        } else if let Some(ref call) = part.function_call {
            let id = if call.id.is_empty() {
                ids::tool_use_id()
            } else {
                call.id.clone()
            };
            tool_blocks.push(ContentBlock::ToolUse {
                id,
                name: call.name.clone(),
                input: Value::Object(call.args.clone()),
            });
        }
    }

    let mut content = Vec::new();
    // The thinking block must precede the text block.
    if !thinking.is_empty() {
        content.push(ContentBlock::Thinking {
            thinking: thinking.clone(),
            signature,
        });
    }
    if !text.is_empty() {
        content.push(ContentBlock::Text { text: text.clone() });
    }
    let has_tools = !tool_blocks.is_empty();
    content.extend(tool_blocks);

    let mut output_tokens = resp
        .response
        .usage_metadata
        .map_or(0, |u| u.candidates_token_count);
    if output_tokens == 0 {
        let mut combined = thinking;
        combined.push_str(&text);
        output_tokens = estimate_tokens(&combined);
    }

    MessagesResponse {
        id: format!("msg_{request_id}"),
        kind: "message".into(),
        role: "assistant".into(),
        model: model.to_string(),
        content,
        stop_reason: stop_reason(has_tools).into(),
        stop_sequence: None,
        usage: ClaudeUsage {
            input_tokens,
            output_tokens,
        },
    }
}

/// `tool_use` when any tool call was emitted, else `end_turn`.
#[must_use]
pub fn stop_reason(has_tool_calls: bool) -> &'static str {
    if has_tool_calls {
        "tool_use"
    } else {
        "end_turn"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
