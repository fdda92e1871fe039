//! Japan News Curator — Binary Entrypoint
//! Boots the Axum HTTP server exposing the analyze trigger, health check,
//! and Prometheus metrics.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use japan_news_curator::api::{create_router, AppState};
use japan_news_curator::config::{load_denylist_default, AppConfig};
use japan_news_curator::metrics::Metrics;
use japan_news_curator::pipeline::AppContext;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("japan_news_curator=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;
    let denylist = load_denylist_default().context("loading denylist")?;
    let ctx = Arc::new(AppContext::from_config(&config, denylist));

    let metrics = Metrics::init();
    let router = create_router(AppState { ctx }).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    axum::serve(listener, router).await.context("serving")?;
    Ok(())
}
