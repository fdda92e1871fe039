//! One-shot CLI runner: performs a single curation run and prints the
//! report. Exit code 1 on a fatal stage failure.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use japan_news_curator::config::{load_denylist_default, AppConfig};
use japan_news_curator::pipeline::{self, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("japan_news_curator=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let denylist = load_denylist_default().context("loading denylist")?;
    let ctx = Arc::new(AppContext::from_config(&config, denylist));

    match pipeline::run(&ctx).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(failure) => {
            for line in &failure.logs {
                eprintln!("{line}");
            }
            eprintln!(
                "執行失敗：{}（{:.2}s）",
                failure.error, failure.execution_time_seconds
            );
            std::process::exit(1);
        }
    }
}
