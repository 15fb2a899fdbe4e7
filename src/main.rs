use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use strangers::{AppState, Config, Coordinator, chat};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strangers=info")))
        .init();

    let config = Arc::new(Config::from_env()?);
    let coordinator = Coordinator::new(Config::clone(&config));
    let reaper = coordinator.spawn_reaper();

    let app_state = AppState {
        coordinator,
        config: config.clone(),
    };

    let app = Router::new()
        .merge(chat::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("couldn't bind {}", config.bind_addr))?;
    info!(
        "listening on {} (queue timeout {:?}, idle timeout {:?})",
        config.bind_addr, config.queue_timeout, config.idle_timeout
    );

    axum::serve(listener, app).await.context("server stopped")?;
    reaper.abort();
    Ok(())
}
