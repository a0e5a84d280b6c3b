//! Anthropic Messages wire types.
//!
//! `content` (string-or-array) and `system` (likewise) stay raw
//! `Value`s; the converter interprets them. Response content and SSE
//! events are tagged enums so the `type` discriminator serializes
//! without hand-written plumbing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `/v1/messages` request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MessagesRequest {
    /// Client-facing model ID.
    pub model: String,
    /// Required output budget.
    #[serde(default)]
    pub max_tokens: u32,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// System prompt: string or block array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    /// Whether to stream.
    #[serde(default)]
    pub stream: bool,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Top-P sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Extra stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Tool declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Tool choice (accepted, relayed as AUTO).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    /// Extended-thinking directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingDirective>,
    /// Client metadata (ignored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One conversation message; content is string or block array.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Message {
    /// `user` or `assistant`.
    pub role: String,
    /// Polymorphic content.
    #[serde(default)]
    pub content: Value,
}

/// Tool declaration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// JSON-Schema input description.
    pub input_schema: Value,
}

/// Extended-thinking directive.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ThinkingDirective {
    /// `enabled` or `disabled`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Thinking token budget.
    #[serde(rename = "budget_tokens", alias = "budget", default)]
    pub budget: Option<u32>,
    /// Thinking level.
    #[serde(rename = "thinking_level", default)]
    pub level: Option<String>,
}

/// Response content block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Visible text.
    Text {
        /// The text.
        text: String,
    },
    /// Extended thinking.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        signature: String,
    },
    /// Tool invocation.
    ToolUse {
        /// Block ID.
        id: String,
        /// Tool name.
        name: String,
        /// Decoded input.
        input: Value,
    },
}

/// `/v1/messages` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Message ID (`msg_<request id>`).
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Always `"assistant"`.
    pub role: String,
    /// Echoed model ID.
    pub model: String,
    /// Content blocks.
    pub content: Vec<ContentBlock>,
    /// `end_turn`, `tool_use`, …
    pub stop_reason: String,
    /// Matched stop sequence (always null here).
    pub stop_sequence: Option<String>,
    /// Token usage.
    pub usage: ClaudeUsage,
}

/// Token usage pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaudeUsage {
    /// Input tokens.
    pub input_tokens: u32,
    /// Output tokens.
    pub output_tokens: u32,
}

/// `/v1/messages/count_tokens` response. Three spellings of the same
/// number for client compatibility.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TokenCountResponse {
    /// Canonical field.
    pub input_tokens: u32,
    /// Legacy alias.
    pub token_count: u32,
    /// Legacy alias.
    pub tokens: u32,
}

/// Error envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `"error"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The error payload.
    pub error: ErrorDetail,
}

/// Error payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error type slug.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorResponse {
    /// Build an error envelope.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: "error".into(),
            error: ErrorDetail {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE events
// ─────────────────────────────────────────────────────────────────────────────

/// Opening payload of a content block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    /// Text block (opens with empty text).
    Text {
        /// Always `""` at start.
        text: String,
    },
    /// Thinking block (opens with empty thinking).
    Thinking {
        /// Always `""` at start.
        thinking: String,
    },
    /// Tool-use block (opens with the call identity and empty input).
    ToolUse {
        /// Call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Always `{}` at start.
        input: Value,
    },
}

/// Delta payload within a content block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Visible-text fragment.
    TextDelta {
        /// The fragment.
        text: String,
    },
    /// Thinking fragment.
    ThinkingDelta {
        /// The fragment.
        thinking: String,
    },
    /// Stringified tool input.
    InputJsonDelta {
        /// JSON fragment.
        partial_json: String,
    },
    /// Thinking-block signature.
    SignatureDelta {
        /// The signature.
        signature: String,
    },
}

/// `message_start` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageStartPayload {
    /// Message ID.
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Always `"assistant"`.
    pub role: String,
    /// Echoed model.
    pub model: String,
    /// Always null at start.
    pub stop_sequence: Option<String>,
    /// Input tokens known up front.
    pub usage: ClaudeUsage,
    /// Always empty at start.
    pub content: Vec<ContentBlock>,
    /// Always null at start.
    pub stop_reason: Option<String>,
}

/// `message_delta` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageDeltaPayload {
    /// Final stop reason.
    pub stop_reason: String,
    /// Always null.
    pub stop_sequence: Option<String>,
}

/// One Claude SSE event. The serde tag doubles as the `event:` name.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeEvent {
    /// Stream opening.
    MessageStart {
        /// The message shell.
        message: MessageStartPayload,
    },
    /// Block opening.
    ContentBlockStart {
        /// Block index.
        index: u32,
        /// Opening payload.
        content_block: StartBlock,
    },
    /// Block delta.
    ContentBlockDelta {
        /// Block index.
        index: u32,
        /// The delta.
        delta: BlockDelta,
    },
    /// Block close.
    ContentBlockStop {
        /// Block index.
        index: u32,
    },
    /// Final stop reason + usage.
    MessageDelta {
        /// Stop payload.
        delta: MessageDeltaPayload,
        /// Final usage.
        usage: ClaudeUsage,
    },
    /// Stream close.
    MessageStop,
}

impl ClaudeEvent {
    /// The `event:` field name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
        }
    }

    /// Serialize as a full SSE frame.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".into());
        format!("event: {}\ndata: {json}\n\n", self.event_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
