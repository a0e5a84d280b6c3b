//! Gemini ⇄ canonical translation and sanitization.

use std::collections::HashMap;

use serde_json::Value;

use skyhook_core::ids;
use skyhook_core::models::{
    build_thinking_config, is_claude_model, resolve_model_name, should_enable_thinking,
    stop_sequences_with, SUPPORTED_MODELS,
};
use skyhook_core::types::{
    AntigravityRequest, AntigravityResponse, Content, GenerationConfig, InnerRequest,
};

use crate::types::{GeminiModel, GeminiModelsResponse, GeminiRequest, GeminiResponse};

/// Headroom added above the thinking budget for Gemini-family models.
const GEMINI_THINKING_HEADROOM: u32 = 4096;

/// Output floor for Gemini-family models when thinking is on.
const GEMINI_MIN_OUTPUT_TOKENS: u32 = 8192;

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

/// Build the canonical upstream request from a Gemini request.
#[must_use]
pub fn build_antigravity_request(
    model: &str,
    req: &GeminiRequest,
    scope: &RequestScope,
) -> AntigravityRequest {
    let model = resolve_model_name(model).to_string();

    let inner = InnerRequest {
        contents: sanitize_contents(&req.contents),
        system_instruction: req.system_instruction.clone(),
        tools: if req.tools.is_empty() {
            None
        } else {
            Some(req.tools.clone())
        },
        tool_config: req.tool_config.clone(),
        generation_config: Some(build_generation_config(
            req.generation_config.as_ref(),
            &model,
        )),
        session_id: scope.session_id.clone(),
    };

    AntigravityRequest {
        project: scope.project.clone(),
        request_id: ids::request_id(),
        request: inner,
        model,
        user_agent: scope.user_agent.clone(),
        request_type: None,
    }
}

/// Drop completely empty parts and recover function-response names from
/// the request's own call history. A missing `thoughtSignature` is left
/// missing: forwarding a stale one contaminates later turns.
fn sanitize_contents(contents: &[Content]) -> Vec<Content> {
    let mut call_names: HashMap<String, String> = HashMap::new();
    for content in contents {
        for part in &content.parts {
            if let Some(ref call) = part.function_call {
                if !call.id.is_empty() && !call.name.is_empty() {
                    let _ = call_names.insert(call.id.clone(), call.name.clone());
                }
            }
        }
    }

    contents
        .iter()
        .map(|content| {
            let parts = content
                .parts
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .map(|mut part| {
                    if let Some(ref mut response) = part.function_response {
                        if response.name.is_empty() {
                            if let Some(name) = call_names.get(&response.id) {
                                response.name = name.clone();
                            }
                        }
                    }
                    part
                })
                .collect();
            Content {
                role: content.role.clone(),
                parts,
            }
        })
        .filter(|c| !c.parts.is_empty())
        .collect()
}

fn build_generation_config(req_config: Option<&GenerationConfig>, model: &str) -> GenerationConfig {
    let mut config = GenerationConfig {
        candidate_count: Some(1),
        stop_sequences: stop_sequences_with(&[]),
        ..GenerationConfig::default()
    };

    if let Some(rc) = req_config {
        if let Some(max) = rc.max_output_tokens {
            if max > 0 {
                config.max_output_tokens = Some(max);
            }
        }
        config.temperature = rc.temperature;
        config.top_p = rc.top_p;
        config.top_k = rc.top_k;
        if !rc.stop_sequences.is_empty() {
            config.stop_sequences = stop_sequences_with(&rc.stop_sequences);
        }
        config.thinking_config = rc.thinking_config.clone();
    }

    if config.thinking_config.is_none() && should_enable_thinking(model, None) {
        config.thinking_config = Some(build_thinking_config(model));
    }

    // Gemini-family models need headroom above the thinking budget.
    if !is_claude_model(model) {
        if let Some(budget) = config
            .thinking_config
            .as_ref()
            .and_then(|tc| tc.thinking_budget)
        {
            let floor = (budget + GEMINI_THINKING_HEADROOM).max(GEMINI_MIN_OUTPUT_TOKENS);
            match config.max_output_tokens {
                Some(max) if max > budget + GEMINI_THINKING_HEADROOM => {}
                _ => config.max_output_tokens = Some(floor),
            }
        }
    }

    config
}

/// Unwrap the Antigravity envelope into a standard Gemini response,
/// ensuring every candidate carries its index. `thoughtSignature`
/// fields are preserved for the client to echo back.
#[must_use]
pub fn extract_gemini_response(resp: &AntigravityResponse) -> GeminiResponse {
    let mut candidates = resp.response.candidates.clone();
    for (i, candidate) in candidates.iter_mut().enumerate() {
        if candidate.index == 0 {
            candidate.index = u32::try_from(i).unwrap_or(0);
        }
    }
    GeminiResponse {
        candidates,
        usage_metadata: resp.response.usage_metadata,
    }
}

/// Rewrite one upstream SSE line for the first-party Gemini route:
/// unwrap the outer `response` envelope and ensure candidate indices.
/// Non-data lines and unparseable payloads pass through untouched.
#[must_use]
pub fn transform_stream_line(line: &str) -> String {
    let Some(payload) = line.strip_prefix("data: ") else {
        return line.to_string();
    };

    let Ok(mut data) = serde_json::from_str::<Value>(payload) else {
        return line.to_string();
    };

    let Some(mut response) = data.get_mut("response").map(Value::take) else {
        return line.to_string();
    };

    if let Some(candidates) = response.get_mut("candidates").and_then(Value::as_array_mut) {
        for (i, candidate) in candidates.iter_mut().enumerate() {
            if let Some(obj) = candidate.as_object_mut() {
                if !obj.contains_key("index") {
                    let _ = obj.insert("index".into(), Value::from(i));
                }
            }
        }
    }

    match serde_json::to_string(&response) {
        Ok(json) => format!("data: {json}"),
        Err(_) => line.to_string(),
    }
}

/// The model catalog in Gemini list form.
#[must_use]
pub fn gemini_model_catalog() -> GeminiModelsResponse {
    GeminiModelsResponse {
        models: SUPPORTED_MODELS
            .iter()
            .map(|m| GeminiModel {
                name: format!("models/{}", m.id),
                display_name: m.id.to_string(),
                description: format!("Model provided by {}", m.owned_by),
                supported_generation_methods: vec![
                    "generateContent".into(),
                    "streamGenerateContent".into(),
                ],
            })
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
