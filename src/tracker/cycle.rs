//! One fetch-diff-persist cycle.
//!
//! The new snapshot is built in full before anything is written; any error
//! before `save` leaves the persisted snapshot untouched.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::dispatch::Dispatcher;
use crate::diff::{DiffEngine, LiveResults};
use crate::error::Result;
use crate::models::{ChangeSet, Snapshot};
use crate::scrapers::RateLimitedFetcher;
use crate::snapshot::{validate_page, SnapshotBuilder, SnapshotStore};

/// Window geometry: `pages` ranking pages of `page_size` entries.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub pages: u32,
    pub page_size: u32,
}

impl WindowConfig {
    pub fn size(&self) -> usize {
        self.pages as usize * self.page_size as usize
    }
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub changes: ChangeSet,
    pub elapsed: Duration,
    /// No previous snapshot existed; nothing was diffed.
    pub bootstrap: bool,
}

/// Something the scheduler can run once per tick.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self) -> Result<CycleReport>;
}

pub struct Tracker {
    fetcher: RateLimitedFetcher,
    store: Arc<dyn SnapshotStore>,
    dispatcher: Arc<dyn Dispatcher>,
    engine: DiffEngine,
    window: WindowConfig,
}

impl Tracker {
    pub fn new(
        fetcher: RateLimitedFetcher,
        store: Arc<dyn SnapshotStore>,
        dispatcher: Arc<dyn Dispatcher>,
        window: WindowConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            dispatcher,
            engine: DiffEngine::new(),
            window,
        }
    }

    async fn load_previous(&self) -> Result<Option<Snapshot>> {
        match self.store.load().await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if e.is_not_found() => {
                info!("📭 No previous snapshot, bootstrapping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch every page and each entity's results into a fresh snapshot.
    async fn build_snapshot(&self) -> Result<(Snapshot, LiveResults)> {
        let mut builder = SnapshotBuilder::new(self.window.size());
        let mut live = LiveResults::with_capacity(self.window.size());

        for page in 1..=self.window.pages {
            let entries = self.fetcher.fetch_ranking_page(page).await?;
            validate_page(page, &entries, self.window.page_size)?;

            for entry in entries {
                let results = self.fetcher.fetch_recent_results(entry.id).await?;
                let result_ids = results.iter().map(|r| r.id).collect();
                let id = builder.push(entry, result_ids)?.id;
                live.insert(id, results);
            }
        }

        Ok((builder.finish(Utc::now())?, live))
    }

    /// Fill in the advisory restriction flag; lookup failures never drop a departure.
    async fn annotate_departures(&self, changes: &mut ChangeSet) {
        for departure in &mut changes.departures {
            match self.fetcher.lookup_profile(departure.id).await {
                Ok(profile) => {
                    departure.restricted = Some(profile.is_restricted);
                    info!(
                        entity_id = departure.id,
                        restricted = profile.is_restricted,
                        "Departed player lookup"
                    );
                }
                Err(e) => {
                    warn!(entity_id = departure.id, error = %e, "Departure lookup failed");
                }
            }
        }
    }
}

#[async_trait]
impl CycleRunner for Tracker {
    async fn run_cycle(&self) -> Result<CycleReport> {
        let start = Instant::now();
        info!(window = self.window.size(), "🔄 Started update");

        let previous = self.load_previous().await?;
        let (snapshot, live) = self.build_snapshot().await?;

        let mut changes = self.engine.diff(previous.as_ref(), &snapshot, &live);
        self.annotate_departures(&mut changes).await;

        self.store.save(&snapshot).await?;
        let bootstrap = previous.is_none();
        drop(previous);

        if let Err(e) = self.dispatcher.dispatch(&changes).await {
            warn!(error = %e, "Dispatching change set failed");
        }

        let elapsed = start.elapsed();
        info!(
            elapsed = %format_elapsed(elapsed),
            promotions = changes.promotions.len(),
            new_results = changes.new_results.len(),
            departures = changes.departures.len(),
            "✅ Update done"
        );

        Ok(CycleReport {
            changes,
            elapsed,
            bootstrap,
        })
    }
}

/// `h:mm:ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64().round() as u64;
    let (m, s) = (total / 60, total % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{}:{:02}:{:02}", h, m, s)
}
