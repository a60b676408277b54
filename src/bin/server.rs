use std::sync::Arc;

use tracing::{error, info};

use iat::env_config::{self, SinkConfig};
use iat::server::{create_router, AppState};
use iat::stimulus_pool::StimulusPool;

#[tokio::main]
async fn main() {
    env_config::init_logging();
    let _base = env_config::init_base_path();
    let port = env_config::server_port();
    info!("Starting IAT server...");

    let image_dir = env_config::image_dir();
    let pool = match StimulusPool::load(&image_dir) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!(error = %e, "failed to build stimulus pool");
            std::process::exit(1);
        }
    };

    let sink_config = SinkConfig::from_env();
    info!(sink = sink_config.name(), "results sink");
    let sink = sink_config.build();

    let (idle_ttl, finished_ttl) = env_config::session_ttl();
    let state = match AppState::new(pool, sink, image_dir, env_config::completion_url_template()) {
        Ok(s) => Arc::new(s.with_session_ttl(idle_ttl, finished_ttl)),
        Err(e) => {
            error!(error = %e, "block plan does not fit the stimulus pool");
            std::process::exit(1);
        }
    };
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
        Ok(l) => l,
        Err(e) => {
            error!(port, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(port, "Server is running. Press Ctrl+C to stop.");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
    }

    info!("Stopping server...");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install CTRL+C signal handler");
    }
}
