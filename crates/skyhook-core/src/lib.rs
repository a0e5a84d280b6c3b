//! # skyhook-core
//!
//! Shared foundation for the Skyhook relay: the canonical Antigravity
//! message graph that every client dialect maps to, the supported-model
//! catalog with its alias rules, and ID generation helpers.
//!
//! Nothing in this crate performs I/O — it is the pure data layer the
//! upstream client, the dialect adapters, and the server all build on.

#![deny(unsafe_code)]

pub mod ids;
pub mod models;
pub mod types;

pub use types::{
    AntigravityRequest, AntigravityResponse, Candidate, Content, FunctionCall,
    FunctionCallingConfig, FunctionDeclaration, FunctionResponse, GenerationConfig, InlineData,
    InnerRequest, Part, ResponseBody, SystemInstruction, ThinkingConfig, Tool, ToolCallInfo,
    ToolConfig, Usage, UsageMetadata,
};
