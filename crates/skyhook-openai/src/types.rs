//! OpenAI chat-completions wire types.
//!
//! `content` is polymorphic on the wire (string, block array, or null),
//! so it stays a raw `Value` and the converter interprets it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use skyhook_core::types::Usage;

/// `/v1/chat/completions` request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChatRequest {
    /// Client-facing model ID.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Top-P sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Max completion tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Tool declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Tool choice (accepted, relayed as AUTO).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

/// One conversation message.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChatMessage {
    /// `system`, `user`, `assistant`, or `tool`.
    pub role: String,
    /// String, block array, or null.
    #[serde(default)]
    pub content: Value,
    /// Tool calls on assistant turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Answered call ID on tool turns.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_call_id: String,
    /// Optional participant name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Prior reasoning text on assistant turns.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

/// Tool declaration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ToolDefinition {
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The declared function.
    pub function: FunctionDefinition,
}

/// Declared function.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// JSON-Schema parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool call in a message or delta.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ToolCall {
    /// Call ID.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Called function.
    pub function: ToolCallFunction,
    /// Vendor extension carrying the thought signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_content: Option<ExtraContent>,
}

/// Function name + stringified arguments.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ToolCallFunction {
    /// Function name.
    pub name: String,
    /// Arguments as a JSON string.
    pub arguments: String,
}

/// Vendor extension envelope.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExtraContent {
    /// Google-specific extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleExtra>,
}

/// Google vendor extension.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GoogleExtra {
    /// The thought signature to echo on the next turn.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thought_signature: String,
}

impl ToolCall {
    /// The thought signature, when the vendor extension carries one.
    #[must_use]
    pub fn thought_signature(&self) -> Option<&str> {
        self.extra_content
            .as_ref()
            .and_then(|e| e.google.as_ref())
            .map(|g| g.thought_signature.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Wrap a signature into the vendor extension shape.
    #[must_use]
    pub fn extra_content_for(signature: Option<String>) -> Option<ExtraContent> {
        let signature = signature.filter(|s| !s.is_empty())?;
        Some(ExtraContent {
            google: Some(GoogleExtra {
                thought_signature: signature,
            }),
        })
    }
}

/// Non-streaming response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Completion ID.
    pub id: String,
    /// Always `"chat.completion"`.
    pub object: String,
    /// Unix seconds.
    pub created: i64,
    /// Echoed model ID.
    pub model: String,
    /// Choices (always one).
    pub choices: Vec<ChoiceMessage>,
    /// Token usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Choice carrying a full message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Choice index.
    pub index: u32,
    /// The assistant message.
    pub message: ResponseMessage,
    /// Finish reason.
    pub finish_reason: Option<String>,
}

/// Assistant message in a non-streaming response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Always `"assistant"`.
    pub role: String,
    /// Visible text.
    pub content: String,
    /// Tool calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Reasoning text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

/// Streaming chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion ID (stable across the stream).
    pub id: String,
    /// Always `"chat.completion.chunk"`.
    pub object: String,
    /// Unix seconds.
    pub created: i64,
    /// Echoed model ID.
    pub model: String,
    /// Choices (always one).
    pub choices: Vec<ChoiceDelta>,
    /// Usage, on the final chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Choice carrying a delta.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChoiceDelta {
    /// Choice index.
    pub index: u32,
    /// Incremental payload.
    pub delta: Delta,
    /// Finish reason, on the final chunk.
    pub finish_reason: Option<String>,
}

/// Incremental message payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Delta {
    /// Role, on the first chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Visible text fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Accumulated tool calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// `/v1/models` response.
#[derive(Clone, Debug, Serialize)]
pub struct ModelsResponse {
    /// Always `"list"`.
    pub object: &'static str,
    /// Catalog entries.
    pub data: Vec<skyhook_core::models::ModelInfo>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
