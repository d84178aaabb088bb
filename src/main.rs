//! # Audio Match Gateway - Main Application Entry Point
//!
//! HTTP front door for the song-matching engine. Clients upload a recording to
//! `POST /upload-audio`; the gateway checks that it really is an audio container
//! we accept, stores it transiently, relays it to the engine and hands the
//! engine's answer back.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **error**: Pipeline error kinds and their HTTP responses
//! - **state**: Shared state (config, intake, relay client, metrics)
//! - **intake**: Intake Validator (size cap, sniffing, allow-list, storage)
//! - **relay**: Relay Client for the processing engine
//! - **handlers**: HTTP handlers and the route table
//! - **health**: Liveness, health and metrics endpoints
//! - **middleware**: Request logging and metrics collection

mod config;
mod error;
mod handlers;
mod health;
mod intake;
mod middleware;
mod relay;
mod state;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Creates shared application state** (intake validator, relay client, metrics)
/// 4. **Prepares the storage directory** so the first upload doesn't pay for it
/// 5. **Configures the HTTP server** with middleware and routes
/// 6. **Handles graceful shutdown** on SIGINT / SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        engine = %config.engine.url,
        storage_dir = %config.upload.storage_dir.display(),
        retention = %config.upload.retention,
        max_body_bytes = config.upload.max_body_bytes,
        "Configuration loaded"
    );

    let app_state = AppState::new(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // Not fatal: every upload re-attempts the create.
    match app_state.intake.store().ensure_dir() {
        Ok(dir) => info!(dir = %dir.display(), "Storage directory ready"),
        Err(e) => warn!(error = %e, "Storage directory is not available yet"),
    }

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order for responses
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "audio_match_gateway=trace")
/// - If not set, defaults to "audio_match_gateway=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_match_gateway=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
///
/// If a handler cannot be installed, that signal is simply never observed and a
/// warning is logged.
async fn shutdown_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                warn!(error = %e, "Failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
