//! Gemini wire types. Requests reuse the canonical types directly.

use serde::{Deserialize, Serialize};

use skyhook_core::types::{
    Candidate, Content, GenerationConfig, SystemInstruction, Tool, ToolConfig, UsageMetadata,
};

/// `models/{model}:generateContent` request body.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GeminiRequest {
    /// Conversation turns.
    #[serde(default)]
    pub contents: Vec<Content>,
    /// System instruction.
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    /// Generation parameters.
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// Tool declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Tool-calling configuration.
    #[serde(rename = "toolConfig", skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

/// Standard Gemini response body (the unwrapped envelope).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GeminiResponse {
    /// Response candidates.
    pub candidates: Vec<Candidate>,
    /// Usage metadata.
    #[serde(rename = "usageMetadata", skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

/// `/v1beta/models` catalog entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeminiModel {
    /// `models/<id>`.
    pub name: String,
    /// Display name.
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Supported generation methods.
    #[serde(rename = "supportedGenerationMethods")]
    pub supported_generation_methods: Vec<String>,
}

/// `/v1beta/models` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeminiModelsResponse {
    /// Catalog entries.
    pub models: Vec<GeminiModel>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
