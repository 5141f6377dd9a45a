//! Notification Dispatcher seam.
//!
//! The dispatcher receives structured change data only; rendering and
//! delivery to human channels live behind this trait.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{ChangeSet, TrackerEvent};

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, changes: &ChangeSet) -> Result<()>;
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn dispatch(&self, changes: &ChangeSet) -> Result<()> {
        for promotion in &changes.promotions {
            let displaced = promotion
                .displaced
                .as_ref()
                .map(|d| d.username.as_str())
                .unwrap_or("-");
            info!(
                incoming = %promotion.incoming.username,
                displaced,
                rank = promotion.incoming.country_rank,
                "🆕 New player in the window"
            );
        }

        for new_result in &changes.new_results {
            info!(
                player = %new_result.owner.username,
                result_id = new_result.result.id,
                beatmap_id = new_result.result.beatmap_id,
                grade = new_result.result.grade.as_str(),
                pp = new_result.result.pp.unwrap_or(0.0),
                "🎯 New top result"
            );
        }

        for departure in &changes.departures {
            info!(
                entity_id = departure.id,
                player = %departure.username,
                restricted = ?departure.restricted,
                "👋 Player left the window"
            );
        }
        Ok(())
    }
}

/// Fans events out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    tx: broadcast::Sender<TrackerEvent>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Dispatcher for BroadcastDispatcher {
    async fn dispatch(&self, changes: &ChangeSet) -> Result<()> {
        let events = changes.events();
        let count = events.len();
        for event in events {
            // No subscribers is not an error; events are simply dropped.
            let _ = self.tx.send(event);
        }
        debug!(events = count, receivers = self.tx.receiver_count(), "Broadcast change set");
        Ok(())
    }
}
