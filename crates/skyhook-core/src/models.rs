//! Supported-model catalog and alias rules.
//!
//! Client-facing model IDs map onto upstream IDs through two suffix
//! conventions: `-bypass` aliases its base model and suppresses the thought
//! chain (the relay calls upstream non-streaming for these), and
//! `-thinking` forces the thought chain on.

use serde::Serialize;

use crate::types::ThinkingConfig;

/// One catalog entry, OpenAI `/v1/models` shaped.
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    /// Client-facing model ID.
    pub id: &'static str,
    /// Owning vendor label.
    pub owned_by: &'static str,
    /// Always `"model"`.
    pub object: &'static str,
}

/// Every model the relay advertises.
pub const SUPPORTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-3-pro-high",
        owned_by: "google",
        object: "model",
    },
    ModelInfo {
        id: "gemini-3-pro-low",
        owned_by: "google",
        object: "model",
    },
    // Bypass variants: upstream is called non-streaming to avoid truncation.
    ModelInfo {
        id: "gemini-3-pro-high-bypass",
        owned_by: "google",
        object: "model",
    },
    ModelInfo {
        id: "gemini-3-pro-low-bypass",
        owned_by: "google",
        object: "model",
    },
    ModelInfo {
        id: "claude-opus-4-5-thinking",
        owned_by: "anthropic",
        object: "model",
    },
    ModelInfo {
        id: "claude-sonnet-4-5",
        owned_by: "anthropic",
        object: "model",
    },
    ModelInfo {
        id: "claude-sonnet-4-5-thinking",
        owned_by: "anthropic",
        object: "model",
    },
];

/// Stop sequences appended to every upstream request.
pub const DEFAULT_STOP_SEQUENCES: &[&str] = &[
    "<|user|>",
    "<|bot|>",
    "<|context_request|>",
    "<|endoftext|>",
    "<|end_of_turn|>",
];

/// Unified max output tokens for Claude-family models.
pub const CLAUDE_MAX_OUTPUT_TOKENS: u32 = 64_000;

/// Resolve a client-facing model ID to the upstream ID.
#[must_use]
pub fn resolve_model_name(model: &str) -> &str {
    model.strip_suffix("-bypass").unwrap_or(model)
}

/// Whether this ID names a bypass alias.
#[must_use]
pub fn is_bypass_model(model: &str) -> bool {
    model.ends_with("-bypass")
}

/// Whether this ID names a Claude-family model.
#[must_use]
pub fn is_claude_model(model: &str) -> bool {
    model.to_ascii_lowercase().contains("claude")
}

/// Whether this ID carries the `-thinking` suffix.
#[must_use]
pub fn is_thinking_model(model: &str) -> bool {
    model.ends_with("-thinking")
}

/// Decide whether the thought chain should be enabled for a model.
///
/// Bypass aliases never think. `-thinking` suffixes and the
/// `gemini-3-pro-*` family always do; otherwise an explicit client
/// config decides.
#[must_use]
pub fn should_enable_thinking(model: &str, explicit: Option<&ThinkingConfig>) -> bool {
    if is_bypass_model(model) {
        return false;
    }
    if is_thinking_model(model) {
        return true;
    }
    if model.starts_with("gemini-3-pro-") {
        return true;
    }
    explicit.is_some_and(|tc| tc.include_thoughts)
}

/// Build the default thinking configuration for a model.
#[must_use]
pub fn build_thinking_config(model: &str) -> ThinkingConfig {
    let actual = resolve_model_name(model);

    if actual.starts_with("gemini-3-pro-") {
        // No budget: the backend decides for Gemini 3 Pro.
        return ThinkingConfig {
            include_thoughts: true,
            thinking_budget: None,
            thinking_level: None,
        };
    }

    if is_claude_model(actual) {
        return ThinkingConfig {
            include_thoughts: true,
            thinking_budget: Some(32_000),
            thinking_level: None,
        };
    }

    ThinkingConfig {
        include_thoughts: true,
        thinking_budget: Some(1024),
        thinking_level: None,
    }
}

/// Max output tokens for Claude-family models.
#[must_use]
pub fn claude_max_output_tokens(_model: &str) -> u32 {
    CLAUDE_MAX_OUTPUT_TOKENS
}

/// The default stop sequences plus the request's own.
#[must_use]
pub fn stop_sequences_with(extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = DEFAULT_STOP_SEQUENCES.iter().map(|s| (*s).into()).collect();
    out.extend(extra.iter().cloned());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
