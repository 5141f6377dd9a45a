//! Snapshot Store
//! Persists the last completed window as a versioned JSON document.
//! Saves go through a temp file and a rename so a crash mid-write leaves
//! either the old document or the new one, never a truncated file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::models::{Snapshot, TrackedEntity};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Last persisted snapshot; `TrackerError::NotFound` if none was ever saved.
    async fn load(&self) -> Result<Snapshot>;

    /// Replace the persisted snapshot atomically.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

#[derive(Serialize)]
struct SnapshotDocumentRef<'a> {
    version: u32,
    captured_at: DateTime<Utc>,
    entities: &'a [TrackedEntity],
}

#[derive(Deserialize)]
struct SnapshotDocument {
    version: u32,
    captured_at: DateTime<Utc>,
    entities: Vec<TrackedEntity>,
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let doc = SnapshotDocumentRef {
        version: SNAPSHOT_FORMAT_VERSION,
        captured_at: snapshot.captured_at,
        entities: snapshot.entities(),
    };
    serde_json::to_vec_pretty(&doc)
        .map_err(|e| TrackerError::CorruptState(format!("failed to encode snapshot: {}", e)))
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot> {
    let doc: SnapshotDocument = serde_json::from_slice(bytes)
        .map_err(|e| TrackerError::CorruptState(format!("unparseable snapshot: {}", e)))?;

    if doc.version != SNAPSHOT_FORMAT_VERSION {
        return Err(TrackerError::CorruptState(format!(
            "unsupported snapshot version {} (expected {})",
            doc.version, SNAPSHOT_FORMAT_VERSION
        )));
    }

    Snapshot::from_entities(doc.captured_at, doc.entities).map_err(TrackerError::CorruptState)
}

/// File-backed store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Snapshot> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TrackerError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = decode_snapshot(&bytes)?;
        debug!(
            path = %self.path.display(),
            entities = snapshot.len(),
            "Loaded snapshot"
        );
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = encode_snapshot(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.temp_path();
        let replaced = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = replaced {
            // Never leave a half-written temp file next to the snapshot.
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(
            path = %self.path.display(),
            entities = snapshot.len(),
            bytes = bytes.len(),
            "Saved snapshot"
        );
        Ok(())
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.snapshot.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Snapshot> {
        self.snapshot
            .lock()
            .clone()
            .ok_or_else(|| TrackerError::NotFound(PathBuf::from(":memory:")))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}
