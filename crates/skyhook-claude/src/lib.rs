//! # skyhook-claude
//!
//! The Anthropic `/v1/messages` dialect: wire types, translation to and
//! from the canonical Antigravity request (including thought-signature
//! placement and tool-schema sanitization), token estimation, and the
//! block-oriented SSE state machine.

#![deny(unsafe_code)]

pub mod convert;
pub mod schema;
pub mod sse;
pub mod types;

pub use convert::{
    build_antigravity_request, count_tokens, estimate_tokens, to_messages_response, RequestError,
    RequestScope,
};
pub use schema::sanitize_schema;
pub use sse::MessageStream;
pub use types::{ClaudeEvent, ContentBlock, MessagesRequest, MessagesResponse};
