//! Rate-limited access to the scoring service.

use std::sync::Arc;
use tracing::debug;

use super::rate_limit::CallBudget;
use super::source::ScoreSource;
use crate::error::Result;
use crate::models::{EntityId, PlayerProfile, RankingEntry, ResultSummary};

/// Wraps a [`ScoreSource`] so every call first takes a unit of the shared
/// [`CallBudget`]. Transport errors pass through untouched.
#[derive(Clone)]
pub struct RateLimitedFetcher {
    source: Arc<dyn ScoreSource>,
    budget: CallBudget,
    results_cap: u32,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn ScoreSource>, budget: CallBudget, results_cap: u32) -> Self {
        Self {
            source,
            budget,
            results_cap,
        }
    }

    pub async fn fetch_ranking_page(&self, page: u32) -> Result<Vec<RankingEntry>> {
        self.budget.acquire().await;
        let entries = self.source.ranking_page(page).await?;
        debug!(
            page,
            entries = entries.len(),
            budget_left = self.budget.remaining(),
            "Fetched ranking page"
        );
        Ok(entries)
    }

    /// Recent results, most-recent-first, truncated to the results cap.
    pub async fn fetch_recent_results(&self, id: EntityId) -> Result<Vec<ResultSummary>> {
        self.budget.acquire().await;
        let mut results = self.source.recent_results(id, self.results_cap).await?;
        results.truncate(self.results_cap as usize);
        Ok(results)
    }

    pub async fn lookup_profile(&self, id: EntityId) -> Result<PlayerProfile> {
        self.budget.acquire().await;
        self.source.profile(id).await
    }
}
