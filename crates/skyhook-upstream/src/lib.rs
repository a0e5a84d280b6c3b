//! # skyhook-upstream
//!
//! Everything that talks to the Antigravity upstream: the rotating
//! credential pool with expiry-driven OAuth refresh, the endpoint
//! selector, the HTTP client with its error taxonomy and retry policy,
//! and the SSE stream parser that feeds the dialect emitters.

#![deny(unsafe_code)]

pub mod client;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod oauth;
pub mod retry;
pub mod sse;
pub mod stream;

pub use client::UpstreamClient;
pub use credentials::{Credential, CredentialPool};
pub use endpoints::{Endpoint, EndpointMode, EndpointSelector};
pub use error::{ApiError, UpstreamError, UpstreamResult};
pub use retry::{with_retry, RetryPolicy};
pub use stream::{StreamChunk, StreamCollector, StreamResult};
