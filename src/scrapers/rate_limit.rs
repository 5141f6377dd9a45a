//! Process-wide outbound call budget.
//!
//! Sliding-window limiter: at most `max_calls` acquisitions in any rolling
//! `window`. When the budget is spent the caller is suspended until the
//! oldest call ages out; nothing is ever rejected.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Configuration for the call budget.
#[derive(Debug, Clone)]
pub struct CallBudgetConfig {
    /// Maximum calls per window.
    pub max_calls: u32,
    /// Rolling window duration.
    pub window: Duration,
}

impl Default for CallBudgetConfig {
    fn default() -> Self {
        Self {
            max_calls: 250,
            window: Duration::from_secs(60),
        }
    }
}

/// Shared call budget. Cloning hands out another handle to the same budget.
#[derive(Clone)]
pub struct CallBudget {
    config: CallBudgetConfig,
    // Timestamps of granted calls inside the current window, oldest first.
    granted: Arc<Mutex<VecDeque<Instant>>>,
}

impl CallBudget {
    pub fn new(config: CallBudgetConfig) -> Self {
        let capacity = config.max_calls as usize;
        Self {
            config,
            granted: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Try to take one unit of budget without waiting.
    ///
    /// Returns `Err(wait)` with the time until the next unit frees up.
    fn try_acquire(&self, now: Instant) -> Result<(), Duration> {
        let mut granted = self.granted.lock();

        while let Some(&oldest) = granted.front() {
            if now.duration_since(oldest) >= self.config.window {
                granted.pop_front();
            } else {
                break;
            }
        }

        if (granted.len() as u32) < self.config.max_calls {
            granted.push_back(now);
            return Ok(());
        }

        // Budget spent; the front entry is the next to expire.
        let oldest = granted.front().copied().unwrap_or(now);
        Err((oldest + self.config.window).saturating_duration_since(now))
    }

    /// Take one unit of budget, suspending until one is available.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire(Instant::now()) {
                Ok(()) => return,
                Err(wait) => {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        "Call budget exhausted, waiting"
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// Calls that could be made right now without waiting.
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let granted = self.granted.lock();
        let live = granted
            .iter()
            .filter(|t| now.duration_since(**t) < self.config.window)
            .count() as u32;
        self.config.max_calls.saturating_sub(live)
    }
}
