// File: services/psiclinic_backend/src/main.rs
use psiclinic_backend::{build_router, AppState};
use psiclinic_common::{init_from_config, log_error};
use psiclinic_config::load_config;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, stopping payment watchers");
    state.shutdown();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_from_config(&config.logging);

    let state = match AppState::new(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            log_error(e, "Failed to initialise services");
            return ExitCode::FAILURE;
        }
    };
    let app = build_router(&state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log_error(e, &format!("Failed to bind {}", addr));
            return ExitCode::FAILURE;
        }
    };
    info!("Starting server at http://{}", addr);
    info!("API endpoints available at http://{}/api", addr);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(state))
        .await;
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error(e, "Server error");
            ExitCode::FAILURE
        }
    }
}
