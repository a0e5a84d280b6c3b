//! # skyhook-openai
//!
//! The OpenAI `/v1/chat/completions` dialect: wire types, translation
//! to and from the canonical Antigravity request, and the streaming
//! chunk emitter with its UTF-8 boundary buffers.

#![deny(unsafe_code)]

pub mod convert;
pub mod sse;
pub mod types;

pub use convert::{
    build_antigravity_request, map_finish_reason, parse_args, to_chat_completion, RequestScope,
};
pub use sse::{encode, ChunkEmitter, DONE_FRAME};
pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, ChatRequest, ChoiceDelta, ChoiceMessage,
    Delta, ExtraContent, GoogleExtra, ResponseMessage, ToolCall, ToolCallFunction,
};
