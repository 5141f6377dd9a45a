use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable external identifier of a ranked player.
pub type EntityId = u64;

/// Identifier of a single submitted result (score).
pub type ResultId = u64;

/// Letter grade attached to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "XH")]
    SilverSS,
    #[serde(rename = "X")]
    SS,
    #[serde(rename = "SH")]
    SilverS,
    S,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &str {
        match self {
            Grade::SilverSS => "XH",
            Grade::SS => "X",
            Grade::SilverS => "SH",
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// One row of a ranking page as returned by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub id: EntityId,
    pub username: String,
    pub global_rank: Option<u32>,
}

/// Structured summary of one result, enough for a dispatcher to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub id: ResultId,
    pub beatmap_id: u64,
    pub pp: Option<f64>,
    pub accuracy: f64,
    pub grade: Grade,
    #[serde(default)]
    pub mods: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile lookup used to annotate departures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: EntityId,
    pub username: String,
    #[serde(default)]
    pub is_restricted: bool,
}

/// A player inside the tracked window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: EntityId,
    pub username: String,
    /// 1-based, dense within the window, recomputed every cycle.
    pub country_rank: u32,
    /// Opaque rank reported by the source; absent for inactive players.
    pub global_rank: Option<u32>,
    /// Most-recent-first, capped at the configured results cap.
    pub result_ids: Vec<ResultId>,
}

/// Full state of the window as of one cycle, ordered by `country_rank`.
///
/// Construct through [`crate::snapshot::SnapshotBuilder`] or
/// [`Snapshot::from_entities`]; both enforce unique ids and a contiguous
/// `1..=N` rank permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    entities: Vec<TrackedEntity>,
}

impl Snapshot {
    pub(crate) fn new_unchecked(captured_at: DateTime<Utc>, entities: Vec<TrackedEntity>) -> Self {
        Self {
            captured_at,
            entities,
        }
    }

    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// A new entrant and the entity that held its rank position last cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub incoming: TrackedEntity,
    pub displaced: Option<TrackedEntity>,
}

/// A result that showed up for an entity tracked in both snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResult {
    pub owner: TrackedEntity,
    pub result: ResultSummary,
}

/// An entity that left the window without being displaced by a promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub id: EntityId,
    pub username: String,
    /// Advisory; `None` when the lookup failed or was not performed.
    pub restricted: Option<bool>,
}

/// Output of the diff engine, handed to the notification dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub promotions: Vec<Promotion>,
    pub new_results: Vec<NewResult>,
    pub departures: Vec<Departure>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.promotions.is_empty() && self.new_results.is_empty() && self.departures.is_empty()
    }

    /// Flatten into individual events: promotions, then results, then departures.
    pub fn events(&self) -> Vec<TrackerEvent> {
        let mut events =
            Vec::with_capacity(self.promotions.len() + self.new_results.len() + self.departures.len());
        events.extend(self.promotions.iter().cloned().map(TrackerEvent::Promotion));
        events.extend(self.new_results.iter().cloned().map(TrackerEvent::NewResult));
        events.extend(self.departures.iter().cloned().map(TrackerEvent::Departure));
        events
    }
}

/// Single event as broadcast to outbound consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    Promotion(Promotion),
    NewResult(NewResult),
    Departure(Departure),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_serialization() {
        let json = serde_json::to_string(&Grade::SilverSS).unwrap();
        assert_eq!(json, r#""XH""#);

        let grade: Grade = serde_json::from_str(r#""SH""#).unwrap();
        assert_eq!(grade, Grade::SilverS);
        assert_eq!(grade.as_str(), "SH");
    }

    #[test]
    fn test_event_tagging() {
        let event = TrackerEvent::Departure(Departure {
            id: 7,
            username: "seven".to_string(),
            restricted: Some(true),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "departure");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_events_order() {
        let entity = TrackedEntity {
            id: 1,
            username: "a".to_string(),
            country_rank: 1,
            global_rank: None,
            result_ids: vec![],
        };
        let changes = ChangeSet {
            promotions: vec![Promotion {
                incoming: entity.clone(),
                displaced: None,
            }],
            new_results: vec![],
            departures: vec![Departure {
                id: 2,
                username: "b".to_string(),
                restricted: None,
            }],
        };

        let events = changes.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TrackerEvent::Promotion(_)));
        assert!(matches!(events[1], TrackerEvent::Departure(_)));
    }
}
