//! Snapshot construction, validation and persistence.

pub mod store;

pub use store::{JsonFileStore, MemoryStore, SnapshotStore};

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::error::{Result, TrackerError};
use crate::models::{EntityId, RankingEntry, ResultId, Snapshot, TrackedEntity};

impl Snapshot {
    /// Build a snapshot from entities already carrying their ranks.
    ///
    /// Entities are sorted by `country_rank`; ids must be unique and ranks
    /// must be exactly `1..=len`.
    pub fn from_entities(
        captured_at: DateTime<Utc>,
        mut entities: Vec<TrackedEntity>,
    ) -> std::result::Result<Self, String> {
        entities.sort_by_key(|e| e.country_rank);

        let mut seen = HashSet::with_capacity(entities.len());
        for (idx, entity) in entities.iter().enumerate() {
            let expected = idx as u32 + 1;
            if entity.country_rank != expected {
                return Err(format!(
                    "country ranks not contiguous: expected {} found {}",
                    expected, entity.country_rank
                ));
            }
            if !seen.insert(entity.id) {
                return Err(format!("duplicate entity id {}", entity.id));
            }
        }

        Ok(Snapshot::new_unchecked(captured_at, entities))
    }

    /// Lookup tables for diffing; built once per snapshot.
    pub fn index(&self) -> SnapshotIndex<'_> {
        SnapshotIndex::new(self)
    }
}

/// O(1) id and rank lookups over a snapshot.
pub struct SnapshotIndex<'a> {
    snapshot: &'a Snapshot,
    by_id: HashMap<EntityId, &'a TrackedEntity>,
}

impl<'a> SnapshotIndex<'a> {
    fn new(snapshot: &'a Snapshot) -> Self {
        let by_id = snapshot.entities().iter().map(|e| (e.id, e)).collect();
        Self { snapshot, by_id }
    }

    pub fn by_id(&self, id: EntityId) -> Option<&'a TrackedEntity> {
        self.by_id.get(&id).copied()
    }

    // Entities are stored in rank order with ranks 1..=N, so rank r lives at r-1.
    pub fn by_rank(&self, rank: u32) -> Option<&'a TrackedEntity> {
        let slot = (rank as usize).checked_sub(1)?;
        self.snapshot.entities().get(slot)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.by_id.contains_key(&id)
    }
}

/// Reject a ranking page that breaks the source contract.
pub fn validate_page(page: u32, entries: &[RankingEntry], page_size: u32) -> Result<()> {
    if entries.len() != page_size as usize {
        return Err(TrackerError::DataContractViolation(format!(
            "ranking page {} has {} entries, expected {}",
            page,
            entries.len(),
            page_size
        )));
    }

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.id) {
            return Err(TrackerError::DataContractViolation(format!(
                "duplicate id {} within ranking page {}",
                entry.id, page
            )));
        }
    }
    Ok(())
}

/// Accumulates entities in fetch order and assigns dense country ranks.
///
/// The finished snapshot covers exactly `capacity` positions.
pub struct SnapshotBuilder {
    capacity: usize,
    entities: Vec<TrackedEntity>,
    ids: HashSet<EntityId>,
}

impl SnapshotBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entities: Vec::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// Append the next-ranked entity.
    pub fn push(&mut self, entry: RankingEntry, result_ids: Vec<ResultId>) -> Result<&TrackedEntity> {
        if self.entities.len() >= self.capacity {
            return Err(TrackerError::DataContractViolation(format!(
                "window overflow: more than {} entities",
                self.capacity
            )));
        }
        if !self.ids.insert(entry.id) {
            // Usually the ranking shifted between page fetches.
            return Err(TrackerError::DataContractViolation(format!(
                "entity {} ({}) appears twice in the window",
                entry.id, entry.username
            )));
        }

        let country_rank = self.entities.len() as u32 + 1;
        self.entities.push(TrackedEntity {
            id: entry.id,
            username: entry.username,
            country_rank,
            global_rank: entry.global_rank,
            result_ids,
        });
        Ok(&self.entities[self.entities.len() - 1])
    }

    pub fn finish(self, captured_at: DateTime<Utc>) -> Result<Snapshot> {
        if self.entities.len() != self.capacity {
            return Err(TrackerError::DataContractViolation(format!(
                "window has {} entities, expected {}",
                self.entities.len(),
                self.capacity
            )));
        }
        Ok(Snapshot::new_unchecked(captured_at, self.entities))
    }
}
