//! Typed stream chunks and the per-request collector.
//!
//! Each upstream SSE datum is decoded twice: once into [`StreamChunk`]
//! for the dialect emitters, and once as a raw `serde_json::Value` so
//! the merged-response log snapshot can preserve fields the typed view
//! does not model.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use skyhook_core::types::{Part, ToolCallInfo, UsageMetadata};

/// One upstream SSE datum, typed view.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StreamChunk {
    /// The response envelope.
    #[serde(default)]
    pub response: ChunkResponse,
}

/// Response body of a stream chunk.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkResponse {
    /// Candidates (only index 0 is consumed).
    #[serde(default)]
    pub candidates: Vec<ChunkCandidate>,
    /// Usage metadata, usually only on the final chunk.
    #[serde(rename = "usageMetadata", default)]
    pub usage_metadata: Option<UsageMetadata>,
}

/// One candidate within a chunk.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkCandidate {
    /// Partial content.
    #[serde(default)]
    pub content: ChunkContent,
    /// Finish reason, when the stream is wrapping up.
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

/// Content of a chunk candidate.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkContent {
    /// The parts delivered in this chunk.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl StreamChunk {
    /// The first candidate's parts, empty when absent.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        self.response
            .candidates
            .first()
            .map_or(&[], |c| c.content.parts.as_slice())
    }

    /// The first candidate's finish reason.
    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// Structured summary of a completed stream.
#[derive(Clone, Debug, Default)]
pub struct StreamResult {
    /// Concatenated visible text.
    pub text: String,
    /// Concatenated thought text.
    pub thought_text: String,
    /// Last non-empty signature seen anywhere in the stream.
    pub last_signature: Option<String>,
    /// Every function call, in arrival order.
    pub tool_calls: Vec<ToolCallInfo>,
    /// Final finish reason.
    pub finish_reason: Option<String>,
    /// Usage metadata from the final chunk.
    pub usage: Option<UsageMetadata>,
    /// Original-structure response with consecutive text runs coalesced.
    pub merged_response: Value,
}

/// Accumulates chunks into a [`StreamResult`].
#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    thought_text: String,
    last_signature: Option<String>,
    tool_calls: Vec<ToolCallInfo>,
    finish_reason: Option<String>,
    usage: Option<UsageMetadata>,
    raw_parts: Vec<Value>,
}

impl StreamCollector {
    /// Fresh collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk (typed + raw) into the running aggregate.
    pub fn ingest(&mut self, chunk: &StreamChunk, raw: &Value) {
        if let Some(usage) = chunk.response.usage_metadata {
            self.usage = Some(usage);
        }
        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }

        for part in chunk.parts() {
            if let Some(sig) = part.thought_signature.as_deref() {
                if !sig.is_empty() {
                    self.last_signature = Some(sig.to_string());
                }
            }

            if part.thought {
                self.thought_text.push_str(&part.text);
            } else if !part.text.is_empty() {
                self.text.push_str(&part.text);
            } else if let Some(ref call) = part.function_call {
                let id = if call.id.is_empty() {
                    skyhook_core::ids::tool_call_id()
                } else {
                    call.id.clone()
                };
                self.tool_calls.push(ToolCallInfo {
                    id,
                    name: call.name.clone(),
                    args: call.args.clone(),
                    thought_signature: part
                        .thought_signature
                        .clone()
                        .filter(|s| !s.is_empty()),
                });
            }
        }

        if let Some(parts) = raw
            .pointer("/response/candidates/0/content/parts")
            .and_then(Value::as_array)
        {
            self.raw_parts.extend(parts.iter().cloned());
        }
    }

    /// Finalize into a [`StreamResult`], building the merged response.
    #[must_use]
    pub fn finish(self) -> StreamResult {
        let merged_parts = merge_parts(&self.raw_parts);

        let mut response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": merged_parts},
                "index": 0
            }]
        });
        if let Some(reason) = &self.finish_reason {
            response["candidates"][0]["finishReason"] = json!(reason);
        }
        if let Some(usage) = self.usage {
            response["usageMetadata"] =
                serde_json::to_value(usage).unwrap_or(Value::Null);
        }

        StreamResult {
            text: self.text,
            thought_text: self.thought_text,
            last_signature: self.last_signature,
            tool_calls: self.tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
            merged_response: json!({"response": response}),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum RunKind {
    Text,
    Thought,
}

fn part_kind(part: &Value) -> Option<RunKind> {
    let has_text = part.get("text").and_then(Value::as_str).is_some();
    if !has_text {
        return None;
    }
    if part.get("thought").and_then(Value::as_bool) == Some(true) {
        Some(RunKind::Thought)
    } else {
        Some(RunKind::Text)
    }
}

/// Coalesce consecutive same-kind text/thought parts into one part.
///
/// Within a run the `text` fields concatenate and any extra fields (e.g.
/// `thoughtSignature`) union onto the merged part. A kind switch or a
/// non-text part (function call, inline data) flushes the run, so the
/// original ordering is preserved.
#[must_use]
pub fn merge_parts(parts: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut run: Option<(RunKind, Map<String, Value>, String)> = None;

    let flush = |run: &mut Option<(RunKind, Map<String, Value>, String)>, out: &mut Vec<Value>| {
        if let Some((_, mut fields, text)) = run.take() {
            let _ = fields.insert("text".into(), Value::String(text));
            out.push(Value::Object(fields));
        }
    };

    for part in parts {
        match part_kind(part) {
            Some(kind) => {
                let text = part.get("text").and_then(Value::as_str).unwrap_or_default();
                let extras: Map<String, Value> = part
                    .as_object()
                    .map(|o| {
                        o.iter()
                            .filter(|(k, _)| k.as_str() != "text")
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default();

                match run {
                    Some((run_kind, ref mut fields, ref mut run_text)) if run_kind == kind => {
                        run_text.push_str(text);
                        for (k, v) in extras {
                            let _ = fields.insert(k, v);
                        }
                    }
                    _ => {
                        flush(&mut run, &mut out);
                        run = Some((kind, extras, text.to_string()));
                    }
                }
            }
            None => {
                flush(&mut run, &mut out);
                out.push(part.clone());
            }
        }
    }
    flush(&mut run, &mut out);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
