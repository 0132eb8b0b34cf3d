use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wg_console_ws::{create_app_router, state::AppState, tasks::start_security_cleanup_task};
use wg_shared::Config;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let port = config.server.port;
    let cleanup_every = Duration::from_secs(config.security.cleanup_interval_seconds.max(1));

    let app_state = Arc::new(AppState::new(config).await?);
    let settings = app_state.settings.ensure_initialized().await?;
    info!(
        ip_blocking = settings.ip_blocking_enabled,
        brute_force = settings.brute_force_enabled,
        geoip = settings.geoip_enabled,
        "🔐 Access gate ready"
    );

    let cleanup = start_security_cleanup_task(app_state.clone(), cleanup_every);

    let app = create_app_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🚀 listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    Ok(())
}
