use anyhow::{Context, Result};
use axum::Router;
use tokio::signal::unix::{signal, SignalKind};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::cache::balance::CachedBalance;
use crate::cache::store::DocumentStore;
use crate::cache::token::AccessToken;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes;
use crate::server::routes::BalanceState;
use crate::sources::{FetchJobApi, TokenExchange};

/// Balance endpoints plus the optional metrics route
pub async fn app<A, TS, BS>(settings_config: &SettingsConfig, balance: BalanceState<A, TS, BS>) -> Router
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    let metrics = get_metrics().await;
    Router::new()
        .merge(balance.router())
        .merge(routes::router(&settings_config.metrics, &**metrics))
        .layer(CorsLayer::permissive())
}

/// Start one Axum server and run it until SIGINT/SIGTERM.
pub async fn start<A, TS, BS>(settings_config: &SettingsConfig, balance: BalanceState<A, TS, BS>) -> Result<()>
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    let app = app(settings_config, balance).await;

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", bind_addr))?;
    info!("listening on {}", bind_addr);

    let metrics = get_metrics().await;
    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    metrics.up.set(0);
    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            tracing::error!("cannot install signal handlers, running without graceful shutdown");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown..."),
        _ = sigterm.recv() => info!("Received SIGTERM. Initiating graceful shutdown..."),
    }
}
