mod draw;
pub mod export;
mod import;
mod ledger;
mod roster;
pub mod snapshot;

use crate::llm::LlmManager;
use crate::protocol::ServerMessage;
use crate::schedule::PrizeSchedule;
use crate::store::{LedgerStore, MemoryLedgerStore};
use crate::types::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

pub use draw::DrawEngine;
pub use snapshot::{LocalSnapshot, SnapshotStore};

/// Result of writing one winner to the shared table
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub round: u32,
    pub entrant_id: EntrantId,
    pub result: Result<(), String>,
}

/// Shared application state.
///
/// Lock order: `engine` before `roster`, `ledger` and `schedule`;
/// `unconfirmed` only under `ledger`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DrawConfig>,
    pub roster: Arc<RwLock<Vec<Entrant>>>,
    pub schedule: Arc<RwLock<PrizeSchedule>>,
    /// Completed draws, newest first
    pub ledger: Arc<RwLock<Vec<WinnerRecord>>>,
    /// Winners drawn here that the shared table has not returned yet
    unconfirmed: Arc<RwLock<HashSet<EntrantId>>>,
    pub engine: Arc<RwLock<DrawEngine>>,
    pub sync_status: Arc<RwLock<SyncStatus>>,
    pub store: Arc<dyn LedgerStore>,
    pub snapshots: Option<Arc<SnapshotStore>>,
    pub column_mapper: Option<Arc<LlmManager>>,
    /// Broadcast channel for messages to every connected screen
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel for host-only messages
    pub host_broadcast: broadcast::Sender<ServerMessage>,
    persist_tx: mpsc::UnboundedSender<PersistOutcome>,
    persist_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<PersistOutcome>>>>,
}

impl AppState {
    /// In-memory state with default draw settings
    pub fn new() -> Self {
        Self::with_services(
            DrawConfig::default(),
            Arc::new(MemoryLedgerStore::new()),
            None,
            None,
        )
    }

    pub fn with_services(
        config: DrawConfig,
        store: Arc<dyn LedgerStore>,
        snapshots: Option<SnapshotStore>,
        column_mapper: Option<LlmManager>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        let (host_tx, _host_rx) = broadcast::channel(100);
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let schedule = PrizeSchedule::new(&config.house_sponsor);

        Self {
            config: Arc::new(config),
            roster: Arc::new(RwLock::new(Vec::new())),
            schedule: Arc::new(RwLock::new(schedule)),
            ledger: Arc::new(RwLock::new(Vec::new())),
            unconfirmed: Arc::new(RwLock::new(HashSet::new())),
            engine: Arc::new(RwLock::new(DrawEngine::default())),
            sync_status: Arc::new(RwLock::new(SyncStatus::Connecting)),
            store,
            snapshots: snapshots.map(Arc::new),
            column_mapper: column_mapper.map(Arc::new),
            broadcast: tx,
            host_broadcast: host_tx,
            persist_tx,
            persist_rx: Arc::new(Mutex::new(Some(persist_rx))),
        }
    }

    /// Hand out the persistence outcome stream (only once)
    pub async fn take_persist_outcomes(&self) -> Option<mpsc::UnboundedReceiver<PersistOutcome>> {
        self.persist_rx.lock().await.take()
    }

    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        // Ignore send errors (no receivers connected is fine)
        let _ = self.broadcast.send(msg);
    }

    pub fn broadcast_to_host(&self, msg: ServerMessage) {
        let _ = self.host_broadcast.send(msg);
    }

    pub async fn get_sync_status(&self) -> SyncStatus {
        self.sync_status.read().await.clone()
    }

    /// Update connectivity and tell everyone when it changed
    pub async fn set_sync_status(&self, status: SyncStatus) {
        let mut current = self.sync_status.write().await;
        if *current == status {
            return;
        }
        match &status {
            SyncStatus::Offline { error } => tracing::warn!("Ledger store offline: {}", error),
            other => tracing::info!("Ledger store status: {:?}", other),
        }
        *current = status.clone();
        drop(current);

        self.broadcast_to_all(ServerMessage::Sync { status });
    }

    /// Reset roster, schedule, local ledger and any draw in progress.
    ///
    /// The shared winners table is left alone; the local ledger is refetched
    /// from it so round numbering continues after the recorded winners.
    pub async fn reset_all(&self) {
        let mut engine = self.engine.write().await;
        engine.abort();
        self.roster.write().await.clear();
        *self.schedule.write().await = PrizeSchedule::new(&self.config.house_sponsor);
        let mut ledger = self.ledger.write().await;
        ledger.clear();
        self.unconfirmed.write().await.clear();
        drop(ledger);
        drop(engine);

        tracing::info!("All local state reset");
        self.persist_snapshot().await;
        self.broadcast_schedule(None).await;
        if let Err(e) = self.refresh_ledger().await {
            tracing::warn!("Ledger refetch after reset failed: {}", e);
            self.broadcast_ledger().await;
            self.broadcast_draw_status().await;
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_state_is_idle_and_empty() {
        let state = AppState::new();
        let status = state.draw_status().await;

        assert_eq!(status.phase, DrawPhase::Idle);
        assert_eq!(status.current_round, 1);
        assert_eq!(status.active_prize.description, "Prize #1");
        assert_eq!(status.active_prize.sponsor_name, DEFAULT_HOUSE_SPONSOR);
        assert_eq!(status.counts.total, 0);
        assert_eq!(state.get_sync_status().await, SyncStatus::Connecting);
    }

    #[tokio::test]
    async fn test_reset_keeps_rounds_recorded_in_store() {
        let store = Arc::new(MemoryLedgerStore::new());
        let state = AppState::with_services(DrawConfig::default(), store.clone(), None, None);
        let entrant = Entrant {
            id: "p-1".to_string(),
            name: "Ana".to_string(),
            phone: String::new(),
            entry_code: "1".to_string(),
            assigned_prize: None,
            imported_on: None,
        };
        let slot = PrizeSlot::house_default(1, DEFAULT_HOUSE_SPONSOR);
        store
            .insert(&WinnerRecord::stamp(entrant.clone(), 1, &slot, true))
            .await
            .unwrap();
        state.replace_roster(vec![entrant]).await.unwrap();
        state.refresh_ledger().await.unwrap();

        state.reset_all().await;

        assert!(state.get_roster().await.is_empty());
        assert_eq!(state.get_ledger().await.len(), 1);
        assert_eq!(state.next_round().await, 2);
    }

    #[tokio::test]
    async fn test_reset_with_store_offline_clears_ledger() {
        let store = Arc::new(MemoryLedgerStore::new());
        let state = AppState::with_services(DrawConfig::default(), store.clone(), None, None);
        store.set_reachable(false);

        state.reset_all().await;

        assert!(state.get_ledger().await.is_empty());
        assert!(matches!(
            state.get_sync_status().await,
            SyncStatus::Offline { .. }
        ));
    }

    #[tokio::test]
    async fn test_persist_outcomes_taken_once() {
        let state = AppState::new();
        assert!(state.take_persist_outcomes().await.is_some());
        assert!(state.take_persist_outcomes().await.is_none());
    }

    #[tokio::test]
    async fn test_sync_status_change_is_broadcast_once() {
        let state = AppState::new();
        let mut rx = state.broadcast.subscribe();

        state.set_sync_status(SyncStatus::Online).await;
        state.set_sync_status(SyncStatus::Online).await;

        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::Sync {
                status: SyncStatus::Online
            })
        ));
        assert!(rx.try_recv().is_err());
    }
}
