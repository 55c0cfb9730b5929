//! Local snapshot of the roster and prize schedule.
//!
//! Written after every change so a browser refresh or server restart does
//! not lose the imported data. Winners are not part of the snapshot; they
//! live in the shared ledger store.

use super::AppState;
use crate::schedule::PrizeSchedule;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Version 1: roster and schedule
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Snapshot schema version {0} is newer than supported version {1}")]
    UnsupportedVersion(u32, u32),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalSnapshot {
    pub schema_version: u32,
    /// Save timestamp (ISO8601)
    pub saved_at: String,
    pub roster: Vec<Entrant>,
    pub schedule: PrizeSchedule,
}

impl LocalSnapshot {
    pub fn new(roster: Vec<Entrant>, schedule: PrizeSchedule) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            roster,
            schedule,
        }
    }
}

/// JSON file holding the latest [`LocalSnapshot`]
pub struct SnapshotStore {
    path: PathBuf,
    /// Serializes writers so two saves never share the temp file
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing or empty file is `Ok(None)`.
    pub async fn read(&self) -> SnapshotResult<Option<LocalSnapshot>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: LocalSnapshot = serde_json::from_str(&contents)?;
        if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion(
                snapshot.schema_version,
                SNAPSHOT_SCHEMA_VERSION,
            ));
        }
        Ok(Some(snapshot))
    }

    /// Write via a temp file and rename, so readers never see a partial file
    pub async fn save(&self, snapshot: &LocalSnapshot) -> SnapshotResult<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl AppState {
    /// Save roster and schedule to the snapshot file, if one is configured.
    /// Failures are logged and otherwise ignored.
    pub async fn persist_snapshot(&self) {
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        let roster = self.roster.read().await.clone();
        let schedule = self.schedule.read().await.clone();

        if let Err(e) = snapshots.save(&LocalSnapshot::new(roster, schedule)).await {
            tracing::warn!("Failed to save snapshot to {}: {}", snapshots.path().display(), e);
        }
    }

    /// Load roster and schedule saved by a previous run.
    ///
    /// Missing, empty or unreadable snapshots leave the empty defaults in
    /// place. Returns whether anything was restored.
    pub async fn restore_snapshot(&self) -> bool {
        let Some(snapshots) = &self.snapshots else {
            return false;
        };

        let snapshot = match snapshots.read().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("No snapshot at {}, starting empty", snapshots.path().display());
                return false;
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable snapshot at {}: {}",
                    snapshots.path().display(),
                    e
                );
                return false;
            }
        };

        tracing::info!(
            "Restored snapshot from {}: {} entrants, {} prizes",
            snapshot.saved_at,
            snapshot.roster.len(),
            snapshot.schedule.configured_count()
        );
        *self.roster.write().await = snapshot.roster;
        *self.schedule.write().await = snapshot.schedule.normalized();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entrant(id: &str) -> Entrant {
        Entrant {
            id: id.to_string(),
            name: "Ana".to_string(),
            phone: "555".to_string(),
            entry_code: "T-1".to_string(),
            assigned_prize: None,
            imported_on: Some("2026-01-01".to_string()),
        }
    }

    fn state_at(path: PathBuf) -> AppState {
        AppState::with_services(
            DrawConfig::default(),
            Arc::new(MemoryLedgerStore::new()),
            Some(SnapshotStore::new(path)),
            None,
        )
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("snapshot.json"));
        let snapshot = LocalSnapshot::new(
            vec![entrant("p-1")],
            PrizeSchedule::parse_from_text("Acme: Mug", DEFAULT_HOUSE_SPONSOR),
        );

        store.save(&snapshot).await.unwrap();
        assert_eq!(store.read().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_corrupt_and_future_files_are_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = SnapshotStore::new(&path);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(store.read().await, Err(SnapshotError::Corrupt(_))));

        let mut snapshot = LocalSnapshot::new(Vec::new(), PrizeSchedule::new("House"));
        snapshot.schema_version = SNAPSHOT_SCHEMA_VERSION + 1;
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert!(matches!(
            store.read().await,
            Err(SnapshotError::UnsupportedVersion(_, _))
        ));

        std::fs::write(&path, "  \n").unwrap();
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let state = state_at(path.clone());
        state.replace_roster(vec![entrant("p-1")]).await.unwrap();
        state.import_prizes_text("Acme (555): Mug").await;

        let restarted = state_at(path);
        assert!(restarted.restore_snapshot().await);
        assert_eq!(restarted.get_roster().await, vec![entrant("p-1")]);
        assert_eq!(restarted.schedule.read().await.slot_for(1).description, "Mug");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "garbage").unwrap();

        let state = state_at(path);
        assert!(!state.restore_snapshot().await);
        assert!(state.get_roster().await.is_empty());
        assert_eq!(state.schedule.read().await.configured_count(), 0);
    }
}
