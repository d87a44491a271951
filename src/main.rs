use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use book_search::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Configuration decides the log format, so a config error logs as text
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            utils::init_tracing(false);
            error!("Configuration error: {e}");
            return Err(exitcode::CONFIG);
        }
    };
    utils::init_tracing(config.log_json);

    info!(
        "Starting Book Search Service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        host = %config.host,
        port = %config.port,
        upstream = %config.upstream_search_url,
        public_search = config.public_search,
        "Configuration loaded"
    );
    warn!("/login issues a token for any non-empty username and password");

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let state = AppState::new(config.clone()).map_err(|e| {
        error!("Failed to initialize application state: {e}");
        exitcode::SOFTWARE
    })?;
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET /health              - Health check");
    info!("  GET /login               - Issue a bearer token");
    info!("  GET /api/search?author=  - Search by author (bearer token)");
    if config.public_search {
        info!("  GET /search?author=      - Search by author (public)");
    }
    info!("  GET /echo?message=       - Echo a message as HTML");

    // Peer addresses feed the rate limiter's client keys
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
