//! OpenAI ⇄ canonical translation.

use serde_json::{Map, Value};

use skyhook_core::models::{
    build_thinking_config, claude_max_output_tokens, is_claude_model, resolve_model_name,
    should_enable_thinking, stop_sequences_with,
};
use skyhook_core::types::{
    AntigravityRequest, AntigravityResponse, Content, FunctionCall, FunctionResponse,
    GenerationConfig, InlineData, InnerRequest, Part, SystemInstruction, Tool, ToolConfig, Usage,
};
use skyhook_core::{ids, types::FunctionDeclaration};

use crate::types::{
    ChatCompletion, ChatMessage, ChatRequest, ChoiceMessage, ResponseMessage, ToolCall,
    ToolCallFunction, ToolDefinition,
};

/// Per-request identity the server resolves from the acquired credential.
#[derive(Clone, Debug)]
pub struct RequestScope {
    /// Upstream project (credential's, or generated).
    pub project: String,
    /// Credential session affinity token.
    pub session_id: String,
    /// Relay user agent.
    pub user_agent: String,
}

/// Build the canonical upstream request from an OpenAI request.
#[must_use]
pub fn build_antigravity_request(req: &ChatRequest, scope: &RequestScope) -> AntigravityRequest {
    let model = resolve_model_name(&req.model).to_string();

    let mut inner = InnerRequest {
        contents: convert_messages(&req.messages),
        session_id: scope.session_id.clone(),
        ..InnerRequest::default()
    };

    let system_text = extract_system_instruction(&req.messages);
    if !system_text.is_empty() {
        inner.system_instruction = Some(SystemInstruction::from_text(system_text));
    }

    if !req.tools.is_empty() {
        inner.tools = Some(convert_tools(&req.tools));
        inner.tool_config = Some(ToolConfig::auto());
    }

    inner.generation_config = Some(build_generation_config(req, &model));

    AntigravityRequest {
        project: scope.project.clone(),
        request_id: ids::request_id(),
        request: inner,
        model,
        user_agent: scope.user_agent.clone(),
        request_type: None,
    }
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();

    for msg in messages {
        match msg.role.as_str() {
            // System text is hoisted into systemInstruction.
            "system" => {}
            "user" => {
                let parts = extract_user_parts(&msg.content);
                if !parts.is_empty() {
                    contents.push(Content::user(parts));
                }
            }
            "assistant" => {
                let mut parts = Vec::new();
                // Thoughts must precede normal text.
                if !msg.reasoning.is_empty() {
                    parts.push(Part::thought(msg.reasoning.clone()));
                }
                let text = text_content(&msg.content);
                if !text.is_empty() {
                    parts.push(Part::text(text));
                }
                for tc in &msg.tool_calls {
                    let mut part = Part::function_call(FunctionCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        args: parse_args(&tc.function.arguments),
                    });
                    part.thought_signature = tc.thought_signature().map(String::from);
                    parts.push(part);
                }
                if !parts.is_empty() {
                    contents.push(Content::model(parts));
                }
            }
            "tool" => {
                let name = find_function_name(&contents, &msg.tool_call_id);
                let mut response = Map::new();
                let _ = response.insert("output".into(), Value::String(text_content(&msg.content)));
                let part = Part::function_response(FunctionResponse {
                    id: msg.tool_call_id.clone(),
                    name,
                    response,
                });
                append_function_response(&mut contents, part);
            }
            _ => {}
        }
    }

    contents
}

fn extract_system_instruction(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| text_content(&m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn extract_user_parts(content: &Value) -> Vec<Part> {
    match content {
        Value::String(s) => vec![Part::text(s.clone())],
        Value::Array(items) => {
            let mut parts = Vec::new();
            for item in items {
                match item.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            parts.push(Part::text(text));
                        }
                    }
                    Some("image_url") => {
                        let url = item
                            .pointer("/image_url/url")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        if let Some(inline) = parse_image_url(url) {
                            parts.push(Part {
                                inline_data: Some(inline),
                                ..Part::default()
                            });
                        }
                        // Remote URLs are skipped: upstream only takes inline data.
                    }
                    _ => {}
                }
            }
            parts
        }
        _ => Vec::new(),
    }
}

/// Decode a `data:image/<fmt>;base64,<data>` URL.
fn parse_image_url(url: &str) -> Option<InlineData> {
    let rest = url.strip_prefix("data:image/")?;
    let (format, data) = rest.split_once(";base64,")?;
    if format.is_empty() || data.is_empty() || !format.chars().all(char::is_alphanumeric) {
        return None;
    }
    Some(InlineData {
        mime_type: format!("image/{format}"),
        data: data.to_string(),
    })
}

fn text_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|i| i.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|i| i.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Decode a tool-call arguments string; malformed input becomes `{}`.
#[must_use]
pub fn parse_args(raw: &str) -> Map<String, Value> {
    serde_json::from_str::<Map<String, Value>>(raw).unwrap_or_default()
}

/// Recover the function name for a tool response by scanning earlier
/// model turns, newest first.
fn find_function_name(contents: &[Content], tool_call_id: &str) -> String {
    for content in contents.iter().rev() {
        for part in &content.parts {
            if let Some(ref call) = part.function_call {
                if call.id == tool_call_id {
                    return call.name.clone();
                }
            }
        }
    }
    String::new()
}

/// Attach a function response after the preceding model turn; parallel
/// responses coalesce into one user turn.
fn append_function_response(contents: &mut Vec<Content>, part: Part) {
    match contents.last_mut() {
        Some(last) if last.role == "user" => last.parts.push(part),
        _ => contents.push(Content::user(vec![part])),
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Tool> {
    tools
        .iter()
        .map(|t| {
            let mut parameters = t.function.parameters.clone();
            if let Some(Value::Object(ref mut map)) = parameters {
                let _ = map.remove("$schema");
            }
            Tool {
                function_declarations: vec![FunctionDeclaration {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    parameters,
                }],
            }
        })
        .collect()
}

fn build_generation_config(req: &ChatRequest, model: &str) -> GenerationConfig {
    let mut config = GenerationConfig {
        candidate_count: Some(1),
        stop_sequences: stop_sequences_with(&req.stop),
        ..GenerationConfig::default()
    };

    if is_claude_model(model) {
        config.max_output_tokens = Some(claude_max_output_tokens(model));
        // Thought chain and tool calling are mutually exclusive upstream
        // for Claude-family models.
        if req.tools.is_empty() && should_enable_thinking(model, None) {
            config.thinking_config = Some(build_thinking_config(model));
        }
        return config;
    }

    config.temperature = req.temperature;
    config.top_p = req.top_p;
    if let Some(max) = req.max_tokens {
        if max > 0 {
            config.max_output_tokens = Some(max);
        }
    }
    if should_enable_thinking(model, None) {
        config.thinking_config = Some(build_thinking_config(model));
    }

    config
}

/// Map an upstream finish reason onto the OpenAI vocabulary.
#[must_use]
pub fn map_finish_reason(upstream: Option<&str>, has_tool_calls: bool) -> &'static str {
    if has_tool_calls {
        return "tool_calls";
    }
    match upstream {
        Some("MAX_TOKENS") => "length",
        _ => "stop",
    }
}

/// Translate a non-streaming upstream response into an OpenAI completion.
#[must_use]
pub fn to_chat_completion(resp: &AntigravityResponse, model: &str) -> ChatCompletion {
    let parts: &[Part] = resp
        .response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map_or(&[], |c| c.parts.as_slice());

    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut image_urls = Vec::new();

    for part in parts {
        if part.thought {
            reasoning.push_str(&part.text);
        } else if !part.text.is_empty() {
            content.push_str(&part.text);
        } else if let Some(ref call) = part.function_call {
            let id = if call.id.is_empty() {
                ids::tool_call_id()
            } else {
                call.id.clone()
            };
            tool_calls.push(ToolCall {
                id,
                kind: "function".into(),
                function: ToolCallFunction {
                    name: call.name.clone(),
                    arguments: serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".into()),
                },
                extra_content: ToolCall::extra_content_for(part.thought_signature.clone()),
            });
        } else if let Some(ref inline) = part.inline_data {
            image_urls.push(format!("data:{};base64,{}", inline.mime_type, inline.data));
        }
    }

    if !image_urls.is_empty() {
        let mut md = String::new();
        if !content.is_empty() {
            md.push_str(&content);
            md.push_str("\n\n");
        }
        for url in &image_urls {
            md.push_str(&format!("![image]({url})\n\n"));
        }
        content = md;
    }

    let finish_reason = if tool_calls.is_empty() {
        "stop"
    } else {
        "tool_calls"
    };

    ChatCompletion {
        id: ids::chat_completion_id(),
        object: "chat.completion".into(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChoiceMessage {
            index: 0,
            message: ResponseMessage {
                role: "assistant".into(),
                content,
                tool_calls,
                reasoning,
            },
            finish_reason: Some(finish_reason.into()),
        }],
        usage: resp.response.usage_metadata.map(Usage::from),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> RequestScope {
        RequestScope {
            project: "proj-1".into(),
            session_id: "-42".into(),
            user_agent: "relay/1.0".into(),
        }
    }

    fn request_from(v: Value) -> ChatRequest {
        serde_json::from_value(v).unwrap()
    }

    // ── Request translation ──────────────────────────────────────────

    #[test]
    fn simple_user_message() {
        let req = request_from(json!({
            "model": "gemini-3-pro-low",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = build_antigravity_request(&req, &scope());
        assert_eq!(out.model, "gemini-3-pro-low");
        assert_eq!(out.project, "proj-1");
        assert!(out.request_id.starts_with("agent-"));
        assert_eq!(out.request.session_id, "-42");
        assert_eq!(out.request.contents.len(), 1);
        assert_eq!(out.request.contents[0].role, "user");
        assert_eq!(out.request.contents[0].parts[0].text, "hi");
    }

    #[test]
    fn bypass_model_resolves_alias() {
        let req = request_from(json!({
            "model": "gemini-3-pro-high-bypass",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = build_antigravity_request(&req, &scope());
        assert_eq!(out.model, "gemini-3-pro-high");
    }

    #[test]
    fn system_messages_join_into_instruction() {
        let req = request_from(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "one"},
                {"role": "user", "content": "hi"},
                {"role": "system", "content": "two"}
            ]
        }));
        let out = build_antigravity_request(&req, &scope());
        let si = out.request.system_instruction.unwrap();
        assert_eq!(si.parts[0].text, "one\n\ntwo");
        // System messages never appear in contents.
        assert_eq!(out.request.contents.len(), 1);
    }

    #[test]
    fn data_url_image_becomes_inline_data() {
        let req = request_from(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD"}},
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}}
            ]}]
        }));
        let out = build_antigravity_request(&req, &scope());
        let parts = &out.request.contents[0].parts;
        assert_eq!(parts.len(), 2); // remote URL skipped
        let inline = parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "QUJD");
    }

    #[test]
    fn assistant_reasoning_precedes_text() {
        let req = request_from(json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "reasoning": "thinking...",
                "content": "answer"
            }]
        }));
        let out = build_antigravity_request(&req, &scope());
        let parts = &out.request.contents[0].parts;
        assert!(parts[0].thought);
        assert_eq!(parts[0].text, "thinking...");
        assert!(!parts[1].thought);
        assert_eq!(parts[1].text, "answer");
    }

    #[test]
    fn assistant_tool_calls_carry_signature() {
        let req = request_from(json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": {"name": "f", "arguments": "{\"a\":1}"},
                    "extra_content": {"google": {"thought_signature": "sig-1"}}
                }]
            }]
        }));
        let out = build_antigravity_request(&req, &scope());
        let part = &out.request.contents[0].parts[0];
        let call = part.function_call.as_ref().unwrap();
        assert_eq!(call.id, "call_9");
        assert_eq!(call.args["a"], 1);
        assert_eq!(part.thought_signature.as_deref(), Some("sig-1"));
    }

    #[test]
    fn tool_responses_coalesce_into_one_user_turn() {
        let req = request_from(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "go"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "c1", "type": "function", "function": {"name": "f1", "arguments": "{}"}},
                    {"id": "c2", "type": "function", "function": {"name": "f2", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "c1", "content": "r1"},
                {"role": "tool", "tool_call_id": "c2", "content": "r2"}
            ]
        }));
        let out = build_antigravity_request(&req, &scope());
        assert_eq!(out.request.contents.len(), 3);
        let last = &out.request.contents[2];
        assert_eq!(last.role, "user");
        assert_eq!(last.parts.len(), 2);
        let fr1 = last.parts[0].function_response.as_ref().unwrap();
        assert_eq!(fr1.name, "f1");
        assert_eq!(fr1.response["output"], "r1");
        let fr2 = last.parts[1].function_response.as_ref().unwrap();
        assert_eq!(fr2.name, "f2");
    }

    #[test]
    fn tools_get_auto_mode_and_schema_cleanup() {
        let req = request_from(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "go"}],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "f",
                    "description": "d",
                    "parameters": {"$schema": "x", "type": "object"}
                }
            }]
        }));
        let out = build_antigravity_request(&req, &scope());
        let tools = out.request.tools.unwrap();
        let params = tools[0].function_declarations[0].parameters.as_ref().unwrap();
        assert!(params.get("$schema").is_none());
        let mode = out
            .request
            .tool_config
            .unwrap()
            .function_calling_config
            .unwrap()
            .mode;
        assert_eq!(mode, "AUTO");
    }

    // ── Generation config ────────────────────────────────────────────

    #[test]
    fn claude_model_gets_fixed_max_tokens() {
        let req = request_from(json!({
            "model": "claude-sonnet-4-5-thinking",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.3,
            "max_tokens": 100
        }));
        let out = build_antigravity_request(&req, &scope());
        let gc = out.request.generation_config.unwrap();
        assert_eq!(gc.max_output_tokens, Some(64_000));
        // Claude config ignores client temperature.
        assert!(gc.temperature.is_none());
        assert!(gc.thinking_config.is_some());
    }

    #[test]
    fn claude_with_tools_disables_thinking() {
        let req = request_from(json!({
            "model": "claude-sonnet-4-5-thinking",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "function", "function": {"name": "f", "description": ""}}]
        }));
        let out = build_antigravity_request(&req, &scope());
        assert!(out.request.generation_config.unwrap().thinking_config.is_none());
    }

    #[test]
    fn non_claude_carries_sampling_params() {
        let req = request_from(json!({
            "model": "gemini-3-pro-high",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.7,
            "top_p": 0.9,
            "max_tokens": 2048,
            "stop": ["END"]
        }));
        let out = build_antigravity_request(&req, &scope());
        let gc = out.request.generation_config.unwrap();
        assert_eq!(gc.temperature, Some(0.7));
        assert_eq!(gc.top_p, Some(0.9));
        assert_eq!(gc.max_output_tokens, Some(2048));
        assert!(gc.stop_sequences.contains(&"END".to_string()));
        assert!(gc.stop_sequences.contains(&"<|user|>".to_string()));
        assert!(gc.thinking_config.is_some());
    }

    // ── Response translation ─────────────────────────────────────────

    fn upstream_response(parts: Value) -> AntigravityResponse {
        serde_json::from_value(json!({
            "response": {
                "candidates": [{"content": {"role": "model", "parts": parts}}],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4, "totalTokenCount": 14}
            }
        }))
        .unwrap()
    }

    #[test]
    fn plain_text_response() {
        let resp = upstream_response(json!([{"text": "hello"}]));
        let out = to_chat_completion(&resp, "gemini-3-pro-low");
        assert_eq!(out.choices[0].message.content, "hello");
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(out.usage.unwrap().prompt_tokens, 10);
        assert!(out.id.starts_with("chatcmpl-"));
    }

    #[test]
    fn thought_text_becomes_reasoning() {
        let resp = upstream_response(json!([
            {"text": "chain", "thought": true},
            {"text": "answer"}
        ]));
        let out = to_chat_completion(&resp, "m");
        assert_eq!(out.choices[0].message.reasoning, "chain");
        assert_eq!(out.choices[0].message.content, "answer");
    }

    #[test]
    fn function_call_becomes_tool_call_with_signature() {
        let resp = upstream_response(json!([
            {"functionCall": {"name": "f", "args": {"x": 2}}, "thoughtSignature": "sig-2"}
        ]));
        let out = to_chat_completion(&resp, "m");
        let msg = &out.choices[0].message;
        assert_eq!(msg.tool_calls.len(), 1);
        assert!(msg.tool_calls[0].id.starts_with("call_"));
        assert_eq!(msg.tool_calls[0].function.name, "f");
        let args: Value = serde_json::from_str(&msg.tool_calls[0].function.arguments).unwrap();
        assert_eq!(args["x"], 2);
        assert_eq!(msg.tool_calls[0].thought_signature(), Some("sig-2"));
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn inline_data_renders_markdown_image() {
        let resp = upstream_response(json!([
            {"text": "caption"},
            {"inlineData": {"mimeType": "image/png", "data": "QUJD"}}
        ]));
        let out = to_chat_completion(&resp, "m");
        let content = &out.choices[0].message.content;
        assert!(content.starts_with("caption\n\n"));
        assert!(content.contains("![image](data:image/png;base64,QUJD)"));
    }

    #[test]
    fn empty_candidates_yield_empty_message() {
        let resp: AntigravityResponse =
            serde_json::from_value(json!({"response": {"candidates": []}})).unwrap();
        let out = to_chat_completion(&resp, "m");
        assert_eq!(out.choices[0].message.content, "");
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    // ── Helpers ──────────────────────────────────────────────────────

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("STOP"), false), "stop");
        assert_eq!(map_finish_reason(Some("MAX_TOKENS"), false), "length");
        assert_eq!(map_finish_reason(None, false), "stop");
        assert_eq!(map_finish_reason(Some("STOP"), true), "tool_calls");
    }

    #[test]
    fn parse_args_tolerates_garbage() {
        assert!(parse_args("not json").is_empty());
        assert_eq!(parse_args("{\"k\":1}")["k"], 1);
    }

    #[test]
    fn image_url_parsing_rules() {
        assert!(parse_image_url("data:image/jpeg;base64,QUJD").is_some());
        assert!(parse_image_url("https://x.com/a.png").is_none());
        assert!(parse_image_url("data:image/;base64,QUJD").is_none());
        assert!(parse_image_url("data:image/png;base64,").is_none());
    }
}
