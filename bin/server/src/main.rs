use portcullis_server::{
    app,
    auth::AppState,
    config::{ServerConfig, SessionBackend},
    error::StartupError,
};
use rootcause::prelude::Report;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(report) = run().await {
        error!(error = %report, "server stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<StartupError>> {
    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| StartupError::Configuration {
        details: e.to_string(),
    })?;
    info!(
        bind_address = %config.bind_address,
        session_backend = %config.session_store.backend,
        https_only = config.https_only,
        "Loaded configuration"
    );

    let state = Arc::new(AppState::from_config(&config).await?);

    // Spawn periodic session cleanup task; redis expires keys itself
    if config.session_store.backend == SessionBackend::Memory {
        let sessions = Arc::clone(&state.sessions);
        let cleanup_interval_secs = config.session_store.cleanup_interval_seconds.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs));
            loop {
                interval.tick().await;
                let purged = sessions.purge_expired().await;
                if purged > 0 {
                    debug!(purged_sessions = purged, "Periodic session cleanup");
                }
            }
        });
    }

    let app = app::router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| StartupError::Bind {
            address: config.bind_address.clone(),
            details: e.to_string(),
        })?;

    info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Serve {
            details: e.to_string(),
        })?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
