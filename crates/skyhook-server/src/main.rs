//! Skyhook relay entry point.

use tracing::{error, info};

use skyhook_server::{build_router, AppState, Config};

#[tokio::main]
async fn main() {
    skyhook_server::init_subscriber("info");

    let config = Config::from_env();
    if config.panel_password.is_empty() {
        error!("PANEL_PASSWORD is required");
        std::process::exit(1);
    }

    let addr = format!("{}:{}", config.host, config.port);
    let endpoint_mode = config.endpoint_mode.clone();
    let state = AppState::from_config(config);
    info!(
        credentials = state.pool.len().await,
        mode = %endpoint_mode,
        "relay initialized"
    );

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%err, "server error");
        std::process::exit(1);
    }

    info!("server stopped");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
