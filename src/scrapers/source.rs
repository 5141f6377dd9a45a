use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EntityId, PlayerProfile, RankingEntry, ResultSummary};

/// Read-only view of the remote scoring service.
///
/// Implementations perform exactly one remote call per method and never
/// retry; retry policy belongs to the cycle.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// One page of the country ranking, `page` is 1-based.
    async fn ranking_page(&self, page: u32) -> Result<Vec<RankingEntry>>;

    /// Best/most recent results for a player, most-recent-first, at most `limit`.
    async fn recent_results(&self, id: EntityId, limit: u32) -> Result<Vec<ResultSummary>>;

    /// Profile lookup, used for the restriction flag on departures.
    async fn profile(&self, id: EntityId) -> Result<PlayerProfile>;
}
