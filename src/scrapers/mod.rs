pub mod fetcher;
pub mod osu_api; // HTTP client for the scoring service
pub mod rate_limit;
pub mod source;

pub use fetcher::RateLimitedFetcher;
pub use osu_api::{OsuApiClient, OsuApiConfig};
pub use rate_limit::{CallBudget, CallBudgetConfig};
pub use source::ScoreSource;
