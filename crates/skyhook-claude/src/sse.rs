//! Claude streaming state machine.
//!
//! Claude SSE is framed and block-oriented: `message_start`, then for
//! each output block a matched `content_block_start` /
//! `content_block_delta`* / `content_block_stop`, then `message_delta`
//! with the stop reason, finally `message_stop`.
//!
//! Invariants the machine maintains:
//! - at most one text block and one thinking block open at a time,
//!   indices assigned from a monotonically increasing counter;
//! - thinking closes before text opens and vice versa (no nesting);
//! - a buffered `signature_delta` goes out before the thinking block's
//!   `content_block_stop`;
//! - every function call closes all open blocks and emits a
//!   self-contained start/delta/stop triplet.

use serde_json::Value;

use skyhook_core::ids;
use skyhook_core::types::{Part, ToolCallInfo, Usage};

use crate::convert::{estimate_tokens, stop_reason};
use crate::types::{
    BlockDelta, ClaudeEvent, ClaudeUsage, MessageDeltaPayload, MessageStartPayload, StartBlock,
};

/// State machine producing Claude SSE events.
pub struct MessageStream {
    request_id: String,
    model: String,
    input_tokens: u32,
    next_index: u32,
    text_block: Option<u32>,
    thinking_block: Option<u32>,
    finished: bool,
    output_tokens: u32,
    has_tool_calls: bool,
    pending_signature: Option<String>,
}

impl MessageStream {
    /// New stream for one response. Empty IDs and models get fallbacks.
    #[must_use]
    pub fn new(request_id: impl Into<String>, model: impl Into<String>, input_tokens: u32) -> Self {
        let mut request_id = request_id.into();
        if request_id.is_empty() {
            request_id = ids::request_id();
        }
        let mut model = model.into();
        if model.is_empty() {
            model = "claude-relay".into();
        }
        Self {
            request_id,
            model,
            input_tokens,
            next_index: 0,
            text_block: None,
            thinking_block: None,
            finished: false,
            output_tokens: 0,
            has_tool_calls: false,
            pending_signature: None,
        }
    }

    /// Whether any tool call has been emitted.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.has_tool_calls
    }

    /// Capture a signature ahead of part processing (the upstream may
    /// deliver it on any part of the chunk).
    pub fn set_signature(&mut self, signature: &str) {
        if !signature.is_empty() {
            self.pending_signature = Some(signature.to_string());
        }
    }

    /// The opening `message_start` event.
    #[must_use]
    pub fn start(&self) -> ClaudeEvent {
        ClaudeEvent::MessageStart {
            message: MessageStartPayload {
                id: format!("msg_{}", self.request_id),
                kind: "message".into(),
                role: "assistant".into(),
                model: self.model.clone(),
                stop_sequence: None,
                usage: ClaudeUsage {
                    input_tokens: self.input_tokens,
                    output_tokens: 0,
                },
                content: Vec::new(),
                stop_reason: None,
            },
        }
    }

    fn open_text_block(&mut self, events: &mut Vec<ClaudeEvent>) -> u32 {
        if let Some(index) = self.text_block {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.text_block = Some(index);
        events.push(ClaudeEvent::ContentBlockStart {
            index,
            content_block: StartBlock::Text { text: String::new() },
        });
        index
    }

    fn open_thinking_block(&mut self, events: &mut Vec<ClaudeEvent>) -> u32 {
        if let Some(index) = self.thinking_block {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.thinking_block = Some(index);
        events.push(ClaudeEvent::ContentBlockStart {
            index,
            content_block: StartBlock::Thinking {
                thinking: String::new(),
            },
        });
        index
    }

    fn close_text_block(&mut self, events: &mut Vec<ClaudeEvent>) {
        if let Some(index) = self.text_block.take() {
            events.push(ClaudeEvent::ContentBlockStop { index });
        }
    }

    /// Close the thinking block, flushing the buffered signature first.
    fn close_thinking_block(&mut self, events: &mut Vec<ClaudeEvent>) {
        let Some(index) = self.thinking_block.take() else {
            return;
        };
        if let Some(signature) = self.pending_signature.take() {
            events.push(ClaudeEvent::ContentBlockDelta {
                index,
                delta: BlockDelta::SignatureDelta { signature },
            });
        }
        events.push(ClaudeEvent::ContentBlockStop { index });
    }

    /// Emit a visible-text fragment.
    pub fn write_text(&mut self, text: &str) -> Vec<ClaudeEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        // No nesting: thinking closes before text flows.
        self.close_thinking_block(&mut events);
        let index = self.open_text_block(&mut events);
        self.output_tokens += estimate_tokens(text);
        events.push(ClaudeEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta { text: text.into() },
        });
        events
    }

    /// Emit a thinking fragment.
    pub fn write_thinking(&mut self, thinking: &str) -> Vec<ClaudeEvent> {
        if thinking.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        // No nesting: text closes before thinking resumes.
        self.close_text_block(&mut events);
        let index = self.open_thinking_block(&mut events);
        self.output_tokens += estimate_tokens(thinking);
        events.push(ClaudeEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::ThinkingDelta {
                thinking: thinking.into(),
            },
        });
        events
    }

    /// Emit a self-contained tool-use block.
    pub fn write_tool_call(&mut self, call: &ToolCallInfo) -> Vec<ClaudeEvent> {
        self.has_tool_calls = true;

        let mut events = Vec::new();
        self.close_text_block(&mut events);
        self.close_thinking_block(&mut events);

        let index = self.next_index;
        self.next_index += 1;

        let mut args = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".into());
        if args.is_empty() || args == "null" {
            args = "{}".into();
        }
        self.output_tokens += estimate_tokens(&args);

        events.push(ClaudeEvent::ContentBlockStart {
            index,
            content_block: StartBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: Value::Object(serde_json::Map::new()),
            },
        });
        events.push(ClaudeEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta { partial_json: args },
        });
        events.push(ClaudeEvent::ContentBlockStop { index });
        events
    }

    /// Feed one upstream part.
    pub fn process_part(&mut self, part: &Part) -> Vec<ClaudeEvent> {
        if part.thought {
            if let Some(sig) = part.thought_signature.as_deref() {
                self.set_signature(sig);
            }
            self.write_thinking(&part.text)
        } else if !part.text.is_empty() {
            self.write_text(&part.text)
        } else if let Some(ref call) = part.function_call {
            let id = if call.id.is_empty() {
                ids::tool_call_id()
            } else {
                call.id.clone()
            };
            self.write_tool_call(&ToolCallInfo {
                id,
                name: call.name.clone(),
                args: call.args.clone(),
                thought_signature: part.thought_signature.clone(),
            })
        } else {
            Vec::new()
        }
    }

    /// Close open blocks and end the message. Safe to call once; later
    /// calls return nothing.
    pub fn finish(&mut self, usage: Option<Usage>) -> Vec<ClaudeEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        self.close_text_block(&mut events);
        self.close_thinking_block(&mut events);

        let mut input_tokens = self.input_tokens;
        let mut output_tokens = self.output_tokens;
        if let Some(usage) = usage {
            if usage.completion_tokens > 0 {
                output_tokens = usage.completion_tokens;
            }
            if usage.prompt_tokens > 0 {
                input_tokens = usage.prompt_tokens;
            }
        }

        events.push(ClaudeEvent::MessageDelta {
            delta: MessageDeltaPayload {
                stop_reason: stop_reason(self.has_tool_calls).into(),
                stop_sequence: None,
            },
            usage: ClaudeUsage {
                input_tokens,
                output_tokens,
            },
        });
        events.push(ClaudeEvent::MessageStop);
        events
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
