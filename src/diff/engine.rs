//! Diff Engine
//! Compares the previous window against the freshly built one and derives
//! promotions, new results and departures.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::{
    ChangeSet, Departure, EntityId, NewResult, Promotion, ResultId, ResultSummary, Snapshot,
};

/// Current full result lists for the entities of the new snapshot.
pub type LiveResults = HashMap<EntityId, Vec<ResultSummary>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Derive the change set between `old` and `new`.
    ///
    /// With no `old` snapshot (first run) nothing is reported: every entity
    /// would otherwise look like a promotion. Departure restriction flags are
    /// left unset; the cycle fills them in.
    pub fn diff(&self, old: Option<&Snapshot>, new: &Snapshot, live: &LiveResults) -> ChangeSet {
        let Some(old) = old else {
            debug!(entities = new.len(), "No previous snapshot, bootstrap diff");
            return ChangeSet::default();
        };

        let old_index = old.index();
        let new_index = new.index();

        let mut changes = ChangeSet::default();
        let mut displaced_ids: HashSet<EntityId> = HashSet::new();

        for entity in new.entities() {
            match old_index.by_id(entity.id) {
                None => {
                    // Displaced is whoever held this rank position, not this id.
                    let displaced = old_index.by_rank(entity.country_rank).cloned();
                    if let Some(d) = &displaced {
                        displaced_ids.insert(d.id);
                    }
                    changes.promotions.push(Promotion {
                        incoming: entity.clone(),
                        displaced,
                    });
                }
                Some(previous) => {
                    let changed = symmetric_difference(&previous.result_ids, &entity.result_ids);
                    if changed.is_empty() {
                        continue;
                    }

                    // Only ids still in the live list count; the rest is cap churn.
                    let Some(results) = live.get(&entity.id) else {
                        continue;
                    };
                    for result in results.iter().filter(|r| changed.contains(&r.id)) {
                        changes.new_results.push(NewResult {
                            owner: entity.clone(),
                            result: result.clone(),
                        });
                    }
                }
            }
        }

        for entity in old.entities() {
            if new_index.contains(entity.id) || displaced_ids.contains(&entity.id) {
                continue;
            }
            changes.departures.push(Departure {
                id: entity.id,
                username: entity.username.clone(),
                restricted: None,
            });
        }

        changes
    }
}

fn symmetric_difference(old: &[ResultId], new: &[ResultId]) -> HashSet<ResultId> {
    let old: HashSet<ResultId> = old.iter().copied().collect();
    let new: HashSet<ResultId> = new.iter().copied().collect();
    old.symmetric_difference(&new).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, TrackedEntity};
    use chrono::Utc;

    fn entity(id: EntityId, rank: u32, results: &[ResultId]) -> TrackedEntity {
        TrackedEntity {
            id,
            username: format!("player{}", id),
            country_rank: rank,
            global_rank: Some(rank * 100),
            result_ids: results.to_vec(),
        }
    }

    fn snapshot(entities: Vec<TrackedEntity>) -> Snapshot {
        Snapshot::from_entities(Utc::now(), entities).unwrap()
    }

    fn summary(id: ResultId) -> ResultSummary {
        ResultSummary {
            id,
            beatmap_id: id * 3,
            pp: Some(100.0),
            accuracy: 0.98,
            grade: Grade::A,
            mods: vec![],
            created_at: Utc::now(),
        }
    }

    fn live_from(snapshot: &Snapshot) -> LiveResults {
        snapshot
            .entities()
            .iter()
            .map(|e| (e.id, e.result_ids.iter().copied().map(summary).collect()))
            .collect()
    }

    #[test]
    fn test_self_diff_is_empty() {
        let snap = snapshot(vec![
            entity(1, 1, &[10, 11]),
            entity(2, 2, &[20]),
            entity(3, 3, &[]),
        ]);
        let changes = DiffEngine::new().diff(Some(&snap), &snap, &live_from(&snap));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_first_run_reports_nothing() {
        let new = snapshot(vec![entity(1, 1, &[10]), entity(2, 2, &[20])]);
        let changes = DiffEngine::new().diff(None, &new, &live_from(&new));
        assert!(changes.promotions.is_empty());
        assert!(changes.new_results.is_empty());
        assert!(changes.departures.is_empty());
    }

    #[test]
    fn test_promotion_displaces_rank_holder() {
        // old = [1@1, 2@2], new = [3@1, 1@2]
        let old = snapshot(vec![entity(1, 1, &[]), entity(2, 2, &[])]);
        let new = snapshot(vec![entity(3, 1, &[]), entity(1, 2, &[])]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        assert_eq!(changes.promotions.len(), 1);
        assert_eq!(changes.promotions[0].incoming.id, 3);
        assert_eq!(changes.promotions[0].displaced.as_ref().map(|d| d.id), Some(1));

        let departed: Vec<EntityId> = changes.departures.iter().map(|d| d.id).collect();
        assert_eq!(departed, vec![2]);
    }

    #[test]
    fn test_rank_shift_is_not_departure() {
        // Entity 5 moves from rank 5 to rank 3; newcomer 9 takes rank 5.
        let old = snapshot(vec![
            entity(1, 1, &[]),
            entity(2, 2, &[]),
            entity(3, 3, &[]),
            entity(4, 4, &[]),
            entity(5, 5, &[]),
        ]);
        let new = snapshot(vec![
            entity(1, 1, &[]),
            entity(2, 2, &[]),
            entity(5, 3, &[]),
            entity(4, 4, &[]),
            entity(9, 5, &[]),
        ]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        assert_eq!(changes.promotions.len(), 1);
        assert_eq!(changes.promotions[0].incoming.id, 9);
        assert_eq!(changes.promotions[0].displaced.as_ref().map(|d| d.id), Some(5));
        // Entity 3 vanished, it was not the displaced one.
        let departed: Vec<EntityId> = changes.departures.iter().map(|d| d.id).collect();
        assert_eq!(departed, vec![3]);
    }

    #[test]
    fn test_displaced_entity_is_not_departure() {
        let old = snapshot(vec![entity(1, 1, &[]), entity(2, 2, &[])]);
        let new = snapshot(vec![entity(1, 1, &[]), entity(7, 2, &[])]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        assert_eq!(changes.promotions.len(), 1);
        assert_eq!(changes.promotions[0].displaced.as_ref().map(|d| d.id), Some(2));
        assert!(changes.departures.is_empty());
    }

    #[test]
    fn test_cap_churn_yields_single_new_result() {
        // New id 13 pushed in, oldest id 10 fell off the cap.
        let old = snapshot(vec![entity(1, 1, &[12, 11, 10])]);
        let new = snapshot(vec![entity(1, 1, &[13, 12, 11])]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        assert_eq!(changes.new_results.len(), 1);
        assert_eq!(changes.new_results[0].result.id, 13);
        assert_eq!(changes.new_results[0].owner.id, 1);
    }

    #[test]
    fn test_new_results_follow_new_rank_order() {
        let old = snapshot(vec![entity(1, 1, &[10]), entity(2, 2, &[20])]);
        let new = snapshot(vec![entity(2, 1, &[21, 20]), entity(1, 2, &[11, 10])]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        let owners: Vec<EntityId> = changes.new_results.iter().map(|r| r.owner.id).collect();
        assert_eq!(owners, vec![2, 1]);
    }

    #[test]
    fn test_result_missing_from_live_list_is_ignored() {
        let old = snapshot(vec![entity(1, 1, &[10])]);
        let new = snapshot(vec![entity(1, 1, &[11, 10])]);

        let mut live = LiveResults::new();
        live.insert(1, vec![summary(10)]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live);
        assert!(changes.new_results.is_empty());
    }

    #[test]
    fn test_grown_window_promotes_without_displaced() {
        let old = snapshot(vec![entity(1, 1, &[])]);
        let new = snapshot(vec![entity(1, 1, &[]), entity(2, 2, &[])]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        assert_eq!(changes.promotions.len(), 1);
        assert_eq!(changes.promotions[0].incoming.id, 2);
        assert!(changes.promotions[0].displaced.is_none());
        assert!(changes.departures.is_empty());
    }

    #[test]
    fn test_change_lists_are_disjoint() {
        let old = snapshot(vec![
            entity(1, 1, &[10]),
            entity(2, 2, &[20]),
            entity(3, 3, &[30]),
        ]);
        let new = snapshot(vec![
            entity(4, 1, &[40]),
            entity(1, 2, &[11, 10]),
            entity(5, 3, &[50]),
        ]);

        let changes = DiffEngine::new().diff(Some(&old), &new, &live_from(&new));

        let promoted: HashSet<EntityId> =
            changes.promotions.iter().map(|p| p.incoming.id).collect();
        let displaced: HashSet<EntityId> = changes
            .promotions
            .iter()
            .filter_map(|p| p.displaced.as_ref().map(|d| d.id))
            .collect();
        let departed: HashSet<EntityId> = changes.departures.iter().map(|d| d.id).collect();

        assert_eq!(promoted, HashSet::from([4, 5]));
        assert_eq!(displaced, HashSet::from([1, 3]));
        assert_eq!(departed, HashSet::from([2]));
        assert!(displaced.is_disjoint(&departed));
        assert_eq!(changes.new_results.len(), 1);
        assert_eq!(changes.new_results[0].result.id, 11);
    }
}
