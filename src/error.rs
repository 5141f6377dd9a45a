//! Error kinds surfaced by a tracking cycle.
//!
//! Exhausting the call budget is not an error: the fetcher suspends the caller
//! until budget frees up, so there is no variant for it.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Remote call failed or returned something undecodable. The cycle is
    /// aborted and retried from scratch on the next tick.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source broke its contract (duplicate ids, malformed page).
    #[error("data contract violation: {0}")]
    DataContractViolation(String),

    /// Persisted snapshot could not be parsed or fails its invariants.
    #[error("corrupt snapshot state: {0}")]
    CorruptState(String),

    /// No snapshot has been persisted yet.
    #[error("snapshot not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        TrackerError::Transport(e.to_string())
    }
}
