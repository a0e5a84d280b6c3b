//! # skyhook-gemini
//!
//! The Google Gemini `generateContent` dialect. The wire format is
//! structurally identical to the canonical Antigravity body, so this
//! adapter is mostly sanitization: request contents get empty parts
//! dropped and function-response names recovered; responses get the
//! outer envelope unwrapped with candidate indices ensured.

#![deny(unsafe_code)]

pub mod convert;
pub mod types;

pub use convert::{
    build_antigravity_request, extract_gemini_response, gemini_model_catalog,
    transform_stream_line, RequestScope,
};
pub use types::{GeminiRequest, GeminiResponse};
