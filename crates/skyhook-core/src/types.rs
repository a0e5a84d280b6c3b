//! Canonical Antigravity wire types.
//!
//! These are the primitive building blocks every dialect adapter maps to.
//! The field names mirror the upstream JSON exactly (camelCase), so the
//! types serialize straight onto the wire with no translation layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level request envelope sent to the upstream service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AntigravityRequest {
    /// Project identifier the conversation is billed against.
    pub project: String,
    /// Unique request ID (`agent-<uuid>`).
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// The inner generation request.
    pub request: InnerRequest,
    /// Upstream model name (alias-resolved).
    pub model: String,
    /// Client identification string.
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    /// Request type marker.
    #[serde(rename = "requestType", skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
}

/// Inner request body carrying the conversation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InnerRequest {
    /// System instruction, if any.
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    /// Ordered conversation turns.
    pub contents: Vec<Content>,
    /// Tool declarations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool-calling configuration.
    #[serde(rename = "toolConfig", skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    /// Generation parameters.
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// Per-credential session affinity token.
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// A single conversation turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Content {
    /// `"user"` or `"model"`.
    pub role: String,
    /// Ordered message parts.
    pub parts: Vec<Part>,
}

impl Content {
    /// Create a user-role turn.
    #[must_use]
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".into(),
            parts,
        }
    }

    /// Create a model-role turn.
    #[must_use]
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: "model".into(),
            parts,
        }
    }
}

/// One message part. Exactly one payload field is populated; `thought`
/// marks reasoning text and `thought_signature` may ride on any part.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Part {
    /// Text payload (plain or reasoning).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Function call payload.
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// Function response payload.
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    /// Inline binary payload (images).
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Marks this text part as model reasoning.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
    /// Opaque upstream token echoed back on later tool turns.
    #[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl Part {
    /// Create a plain text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Create a reasoning (thought) part.
    #[must_use]
    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thought: true,
            ..Self::default()
        }
    }

    /// Create a function-call part.
    #[must_use]
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    /// Create a function-response part.
    #[must_use]
    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }

    /// Create an inline-data part.
    #[must_use]
    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Self::default()
        }
    }

    /// True when no payload field carries anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
            && self.function_call.is_none()
            && self.function_response.is_none()
            && self.inline_data.is_none()
            && !self.thought
            && self.thought_signature.is_none()
    }
}

/// A function call emitted by the model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call ID, if upstream assigned one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Function name.
    pub name: String,
    /// Decoded argument map.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// A client-supplied function result.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// ID of the call being answered.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Function name (required by the upstream).
    pub name: String,
    /// Response payload map.
    #[serde(default)]
    pub response: Map<String, Value>,
}

/// Inline base64 data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InlineData {
    /// MIME type, e.g. `image/png`.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// System instruction container.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemInstruction {
    /// Parts holding the system prompt text.
    pub parts: Vec<Part>,
}

impl SystemInstruction {
    /// Wrap a single text block.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

/// Tool definition group.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tool {
    /// Function declarations in this group.
    #[serde(
        rename = "functionDeclarations",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// A single function declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON-Schema parameter object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Tool-calling configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Function calling mode + allowlist.
    #[serde(
        rename = "functionCallingConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub function_calling_config: Option<FunctionCallingConfig>,
}

impl ToolConfig {
    /// The `AUTO` calling mode used for all translated tool requests.
    #[must_use]
    pub fn auto() -> Self {
        Self {
            function_calling_config: Some(FunctionCallingConfig {
                mode: "AUTO".into(),
                allowed_function_names: None,
            }),
        }
    }
}

/// Function calling mode selector.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FunctionCallingConfig {
    /// `AUTO`, `ANY`, or `NONE`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    /// Optional allowlist of callable functions.
    #[serde(
        rename = "allowedFunctionNames",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_function_names: Option<Vec<String>>,
}

/// Generation parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Candidate count (always 1 for relayed requests).
    #[serde(rename = "candidateCount", skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    /// Stop sequences.
    #[serde(
        rename = "stopSequences",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub stop_sequences: Vec<String>,
    /// Maximum output tokens.
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Top-P sampling.
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-K sampling.
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Thought-chain configuration.
    #[serde(rename = "thinkingConfig", skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Thought-chain configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Whether to surface thoughts in the response.
    #[serde(rename = "includeThoughts")]
    pub include_thoughts: bool,
    /// Token budget for thinking (0 = backend decides).
    #[serde(rename = "thinkingBudget", skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    /// Discrete thinking level (`low` / `medium` / `high`).
    #[serde(rename = "thinking_level", skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
}

/// Top-level response envelope from the upstream service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AntigravityResponse {
    /// The response body.
    pub response: ResponseBody,
}

/// Response body: candidates plus usage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Response candidates (the relay only reads index 0).
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token usage, when reported.
    #[serde(rename = "usageMetadata", skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

/// A single response candidate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Option<Content>,
    /// Finish reason (`STOP`, `MAX_TOKENS`, …).
    #[serde(rename = "finishReason", skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Candidate index.
    #[serde(default)]
    pub index: u32,
}

/// Upstream token usage.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Prompt token count.
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    /// Output token count.
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    /// Total token count.
    #[serde(rename = "totalTokenCount", default)]
    pub total_token_count: u32,
    /// Thought-chain token count.
    #[serde(
        rename = "thoughtsTokenCount",
        default,
        skip_serializing_if = "is_zero"
    )]
    pub thoughts_token_count: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Flattened function call streamed between the parser and SSE emitters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolCallInfo {
    /// Call ID (generated when upstream omits one).
    pub id: String,
    /// Function name.
    pub name: String,
    /// Decoded argument map.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Signature carried on the call part, if any.
    #[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// OpenAI-shaped usage triple shared by the dialect responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input token count.
    pub prompt_tokens: u32,
    /// Output token count.
    pub completion_tokens: u32,
    /// Total token count.
    pub total_tokens: u32,
}

impl From<UsageMetadata> for Usage {
    fn from(m: UsageMetadata) -> Self {
        Self {
            prompt_tokens: m.prompt_token_count,
            completion_tokens: m.candidates_token_count,
            total_tokens: m.total_token_count,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
