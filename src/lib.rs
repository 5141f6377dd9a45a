//! Leaderboard Tracker Library
//!
//! Periodically fetches a country ranking window and each player's top
//! results, diffs it against the last persisted snapshot and emits
//! promotions, new results and departures.

pub mod config;
pub mod diff;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod scrapers;
pub mod snapshot;
pub mod tracker;

pub use error::{Result, TrackerError};
pub use models::{ChangeSet, Snapshot, TrackedEntity, TrackerEvent};
