//! Leaderboard Tracker
//! Polls the country ranking every interval and reports who entered the
//! window, who set new top results and who dropped out.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaderboard_tracker::{
    config::TrackerConfig,
    scheduler::{CyclePool, PollScheduler},
    scrapers::{CallBudget, OsuApiClient, RateLimitedFetcher, ScoreSource},
    snapshot::{JsonFileStore, SnapshotStore},
    tracker::{Dispatcher, LogDispatcher, Tracker, WindowConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = TrackerConfig::from_env().context("Invalid configuration")?;
    init_tracing();

    info!(
        country = %config.country,
        mode = %config.mode,
        window = config.window_size(),
        snapshot = %config.snapshot_path.display(),
        "🚀 Leaderboard tracker starting"
    );

    let source: Arc<dyn ScoreSource> = Arc::new(
        OsuApiClient::new(config.api_config()?).context("Failed to build API client")?,
    );
    let budget = CallBudget::new(config.budget_config());
    let fetcher = RateLimitedFetcher::new(source, budget, config.results_cap);

    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(&config.snapshot_path));
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(LogDispatcher);

    let tracker = Arc::new(Tracker::new(
        fetcher,
        store,
        dispatcher,
        WindowConfig {
            pages: config.pages,
            page_size: config.page_size,
        },
    ));

    let scheduler = PollScheduler::new(
        tracker,
        CyclePool::new(config.cycle_workers),
        config.poll_interval,
    );
    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, letting the current update finish");
    scheduler.shutdown().await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leaderboard_tracker=debug,tracker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
