//! OpenAI streaming chunk emitter.
//!
//! The emitter is a state machine: each call returns the chunks to send,
//! and the caller frames and writes them. Frame ordering is guaranteed
//! by the single stream task driving the emitter.
//!
//! Text and reasoning each keep a trailing-byte buffer so a multibyte
//! UTF-8 character split across upstream chunks is never emitted as an
//! incomplete sequence: the longest valid prefix goes out, the
//! incomplete tail (at most 3 bytes) waits for the next call.

use skyhook_core::types::{Part, ToolCallInfo, Usage};
use skyhook_core::ids;

use crate::types::{ChatCompletionChunk, ChoiceDelta, Delta, ToolCall, ToolCallFunction};

/// Terminal SSE frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Serialize one chunk as an SSE frame.
#[must_use]
pub fn encode(chunk: &ChatCompletionChunk) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".into());
    format!("data: {json}\n\n")
}

/// Split a byte buffer at the last valid UTF-8 boundary.
///
/// Returns the decoded valid prefix and the incomplete tail. Bytes that
/// are invalid outright (not an incomplete tail) decode lossily so the
/// buffer can never grow without bound.
fn split_utf8_boundary(mut data: Vec<u8>) -> (String, Vec<u8>) {
    match std::str::from_utf8(&data) {
        Ok(_) => (String::from_utf8(data).unwrap_or_default(), Vec::new()),
        Err(e) if e.error_len().is_none() => {
            let tail = data.split_off(e.valid_up_to());
            (String::from_utf8(data).unwrap_or_default(), tail)
        }
        Err(_) => (String::from_utf8_lossy(&data).into_owned(), Vec::new()),
    }
}

/// State machine producing OpenAI `chat.completion.chunk`s.
pub struct ChunkEmitter {
    id: String,
    created: i64,
    model: String,
    sent_role: bool,
    content_buffer: Vec<u8>,
    reasoning_buffer: Vec<u8>,
    pending_tool_calls: Vec<ToolCallInfo>,
}

impl ChunkEmitter {
    /// New emitter for one response stream.
    #[must_use]
    pub fn new(id: impl Into<String>, created: i64, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
            sent_role: false,
            content_buffer: Vec::new(),
            reasoning_buffer: Vec::new(),
            pending_tool_calls: Vec::new(),
        }
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<String>, usage: Option<Usage>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".into(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChoiceDelta {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }

    /// The role-bearing chunk, once per stream.
    fn role_chunk(&mut self) -> Option<ChatCompletionChunk> {
        if self.sent_role {
            return None;
        }
        self.sent_role = true;
        Some(self.chunk(
            Delta {
                role: Some("assistant".into()),
                ..Delta::default()
            },
            None,
            None,
        ))
    }

    /// Emit a visible-text fragment, buffering incomplete UTF-8 tails.
    pub fn write_content(&mut self, bytes: &[u8]) -> Vec<ChatCompletionChunk> {
        let mut out: Vec<ChatCompletionChunk> = self.role_chunk().into_iter().collect();

        let mut data = std::mem::take(&mut self.content_buffer);
        data.extend_from_slice(bytes);
        let (valid, tail) = split_utf8_boundary(data);
        self.content_buffer = tail;

        if !valid.is_empty() {
            out.push(self.chunk(
                Delta {
                    content: Some(valid),
                    ..Delta::default()
                },
                None,
                None,
            ));
        }
        out
    }

    /// Emit a reasoning fragment, buffering incomplete UTF-8 tails.
    pub fn write_reasoning(&mut self, bytes: &[u8]) -> Vec<ChatCompletionChunk> {
        let mut out: Vec<ChatCompletionChunk> = self.role_chunk().into_iter().collect();

        let mut data = std::mem::take(&mut self.reasoning_buffer);
        data.extend_from_slice(bytes);
        let (valid, tail) = split_utf8_boundary(data);
        self.reasoning_buffer = tail;

        if !valid.is_empty() {
            out.push(self.chunk(
                Delta {
                    reasoning: Some(valid),
                    ..Delta::default()
                },
                None,
                None,
            ));
        }
        out
    }

    /// Emit accumulated tool calls as one delta.
    pub fn write_tool_calls(&mut self, calls: Vec<ToolCallInfo>) -> Vec<ChatCompletionChunk> {
        let mut out: Vec<ChatCompletionChunk> = self.role_chunk().into_iter().collect();
        if calls.is_empty() {
            return out;
        }

        let tool_calls = calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                kind: "function".into(),
                function: ToolCallFunction {
                    name: tc.name,
                    arguments: serde_json::to_string(&tc.args).unwrap_or_else(|_| "{}".into()),
                },
                extra_content: ToolCall::extra_content_for(tc.thought_signature),
            })
            .collect();

        out.push(self.chunk(
            Delta {
                tool_calls,
                ..Delta::default()
            },
            None,
            None,
        ));
        out
    }

    /// Feed one upstream part. Function calls accumulate until
    /// [`flush_tool_calls`](Self::flush_tool_calls).
    pub fn process_part(&mut self, part: &Part) -> Vec<ChatCompletionChunk> {
        if part.thought {
            self.write_reasoning(part.text.as_bytes())
        } else if !part.text.is_empty() {
            self.write_content(part.text.as_bytes())
        } else if let Some(ref call) = part.function_call {
            let id = if call.id.is_empty() {
                ids::tool_call_id()
            } else {
                call.id.clone()
            };
            self.pending_tool_calls.push(ToolCallInfo {
                id,
                name: call.name.clone(),
                args: call.args.clone(),
                thought_signature: part.thought_signature.clone().filter(|s| !s.is_empty()),
            });
            Vec::new()
        } else {
            Vec::new()
        }
    }

    /// Flush accumulated function calls (on upstream finish-reason).
    pub fn flush_tool_calls(&mut self) -> Vec<ChatCompletionChunk> {
        let pending = std::mem::take(&mut self.pending_tool_calls);
        self.write_tool_calls(pending)
    }

    /// Flush remaining buffered bytes as final deltas.
    fn flush_buffers(&mut self) -> Vec<ChatCompletionChunk> {
        let mut out = Vec::new();

        let content = std::mem::take(&mut self.content_buffer);
        if !content.is_empty() {
            let text = String::from_utf8_lossy(&content).into_owned();
            out.push(self.chunk(
                Delta {
                    content: Some(text),
                    ..Delta::default()
                },
                None,
                None,
            ));
        }

        let reasoning = std::mem::take(&mut self.reasoning_buffer);
        if !reasoning.is_empty() {
            let text = String::from_utf8_lossy(&reasoning).into_owned();
            out.push(self.chunk(
                Delta {
                    reasoning: Some(text),
                    ..Delta::default()
                },
                None,
                None,
            ));
        }

        out
    }

    /// Final chunk with finish reason and usage. The caller appends
    /// [`DONE_FRAME`] after serializing these.
    pub fn finish(&mut self, reason: &str, usage: Option<Usage>) -> Vec<ChatCompletionChunk> {
        let mut out = self.flush_buffers();
        out.push(self.chunk(Delta::default(), Some(reason.to_string()), usage));
        out
    }

    /// Keep-alive chunk for bypass mode: role on the first one, then
    /// empty deltas.
    pub fn heartbeat(&mut self) -> Vec<ChatCompletionChunk> {
        let mut out: Vec<ChatCompletionChunk> = self.role_chunk().into_iter().collect();
        out.push(self.chunk(Delta::default(), None, None));
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyhook_core::types::FunctionCall;

    fn emitter() -> ChunkEmitter {
        ChunkEmitter::new("chatcmpl-test", 1000, "gemini-3-pro-low")
    }

    fn contents(chunks: &[ChatCompletionChunk]) -> String {
        chunks
            .iter()
            .filter_map(|c| c.choices[0].delta.content.clone())
            .collect()
    }

    // ── Role chunk ───────────────────────────────────────────────────

    #[test]
    fn first_output_carries_role() {
        let mut e = emitter();
        let chunks = e.write_content(b"hi");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("hi"));

        // Role is sent exactly once.
        let more = e.write_content(b" there");
        assert_eq!(more.len(), 1);
        assert!(more[0].choices[0].delta.role.is_none());
    }

    #[test]
    fn reasoning_also_triggers_role() {
        let mut e = emitter();
        let chunks = e.write_reasoning(b"think");
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.reasoning.as_deref(), Some("think"));
    }

    // ── UTF-8 boundary handling ──────────────────────────────────────

    #[test]
    fn multibyte_split_is_buffered() {
        // "你好" = e4 bd a0 e5 a5 bd; split inside "好" after its 2nd byte.
        let bytes = "你好".as_bytes();
        let mut e = emitter();
        let first = e.write_content(&bytes[..5]);
        assert_eq!(contents(&first), "你");
        let second = e.write_content(&bytes[5..]);
        assert_eq!(contents(&second), "好");
    }

    #[test]
    fn arbitrary_splits_reassemble() {
        let text = "héllo 世界 🎉 done";
        let bytes = text.as_bytes();
        for split_at in 0..bytes.len() {
            let mut e = emitter();
            let mut collected = String::new();
            collected.push_str(&contents(&e.write_content(&bytes[..split_at])));
            collected.push_str(&contents(&e.write_content(&bytes[split_at..])));
            collected.push_str(&contents(&e.finish("stop", None)));
            assert_eq!(collected, text, "split at byte {split_at}");
        }
    }

    #[test]
    fn no_delta_contains_invalid_utf8() {
        let bytes = "🎉🎉🎉".as_bytes();
        let mut e = emitter();
        for b in bytes {
            for chunk in e.write_content(std::slice::from_ref(b)) {
                if let Some(ref c) = chunk.choices[0].delta.content {
                    assert!(std::str::from_utf8(c.as_bytes()).is_ok());
                }
            }
        }
    }

    #[test]
    fn content_and_reasoning_buffers_are_independent() {
        let han = "好".as_bytes(); // 3 bytes
        let mut e = emitter();
        let a = e.write_content(&han[..2]);
        let b = e.write_reasoning(&han[..2]);
        assert_eq!(contents(&a), "");
        assert!(b
            .iter()
            .all(|c| c.choices[0].delta.reasoning.as_deref().unwrap_or("").is_empty()
                || c.choices[0].delta.reasoning.is_none()));
        let a2 = e.write_content(&han[2..]);
        assert_eq!(contents(&a2), "好");
        let b2 = e.write_reasoning(&han[2..]);
        assert_eq!(
            b2.iter()
                .filter_map(|c| c.choices[0].delta.reasoning.clone())
                .collect::<String>(),
            "好"
        );
    }

    // ── Tool calls ───────────────────────────────────────────────────

    #[test]
    fn tool_calls_accumulate_until_flush() {
        let mut e = emitter();
        let part = Part {
            function_call: Some(FunctionCall {
                id: String::new(),
                name: "f".into(),
                args: serde_json::from_value(json!({"a": 1})).unwrap(),
            }),
            thought_signature: Some("sig".into()),
            ..Part::default()
        };
        assert!(e.process_part(&part).is_empty());
        assert!(e.process_part(&part).is_empty());

        let chunks = e.flush_tool_calls();
        // role + one tool-calls delta
        assert_eq!(chunks.len(), 2);
        let calls = &chunks[1].choices[0].delta.tool_calls;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].thought_signature(), Some("sig"));
        let args: serde_json::Value =
            serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args["a"], 1);

        // Flush drained the accumulator.
        assert!(e.flush_tool_calls().is_empty());
    }

    // ── Finish ───────────────────────────────────────────────────────

    #[test]
    fn finish_flushes_buffers_then_finishes() {
        let han = "好".as_bytes();
        let mut e = emitter();
        let _ = e.write_content(&han[..2]);
        let chunks = e.finish("stop", Some(Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        }));
        // buffered tail flushed (lossily complete) + finish chunk
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].choices[0].delta.content.is_some());
        let last = chunks.last().unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn encode_frames_and_done() {
        let mut e = emitter();
        let chunks = e.finish("stop", None);
        let frame = encode(&chunks[0]);
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert_eq!(DONE_FRAME, "data: [DONE]\n\n");
    }

    // ── Heartbeat ────────────────────────────────────────────────────

    #[test]
    fn heartbeat_role_then_empty_deltas() {
        let mut e = emitter();
        let first = e.heartbeat();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].choices[0].delta.role.as_deref(), Some("assistant"));
        let v = serde_json::to_value(&first[1].choices[0].delta).unwrap();
        assert_eq!(v, json!({}));

        let second = e.heartbeat();
        assert_eq!(second.len(), 1);
        let v = serde_json::to_value(&second[0].choices[0].delta).unwrap();
        assert_eq!(v, json!({}));
    }

    // ── Part dispatch ────────────────────────────────────────────────

    #[test]
    fn process_part_routes_by_kind() {
        let mut e = emitter();
        let thought = Part::thought("t");
        let text = Part::text("v");
        let chunks_t = e.process_part(&thought);
        assert!(chunks_t
            .iter()
            .any(|c| c.choices[0].delta.reasoning.as_deref() == Some("t")));
        let chunks_v = e.process_part(&text);
        assert!(chunks_v
            .iter()
            .any(|c| c.choices[0].delta.content.as_deref() == Some("v")));
        assert!(e.process_part(&Part::default()).is_empty());
    }
}
