//! # skyhook-server
//!
//! The relay's HTTP surface: axum routes for the three client dialects,
//! API-key and panel-session middleware, the per-request pipeline
//! (decode → acquire credential → translate → call upstream → emit),
//! the in-memory request log, and the admin/account JSON API.

#![deny(unsafe_code)]

pub mod config;
pub mod handlers;
pub mod logs;
pub mod middleware;
pub mod routes;
pub mod sessions;
pub mod state;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;

/// Initialize the global tracing subscriber (stderr, env-filtered).
/// Safe to call more than once; later calls are no-ops.
pub fn init_subscriber(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
