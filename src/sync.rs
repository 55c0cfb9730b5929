//! Background tasks tying the local ledger to the shared winners table.

use crate::protocol::ServerMessage;
use crate::state::{AppState, PersistOutcome};
use crate::store::LedgerStore;
use crate::types::SyncStatus;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Running sync tasks; call [`SyncHandle::shutdown`] to stop them
pub struct SyncHandle {
    tasks: Vec<JoinHandle<()>>,
    store: Arc<dyn LedgerStore>,
}

impl SyncHandle {
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.store.shutdown().await;
        tracing::info!("Ledger sync ({}) stopped", self.store.name());
    }
}

/// Start the ledger follower and the persistence reporter
pub async fn start(state: Arc<AppState>) -> SyncHandle {
    let mut tasks = vec![spawn_ledger_sync(state.clone())];
    match state.take_persist_outcomes().await {
        Some(outcomes) => tasks.push(spawn_persist_reporter(state.clone(), outcomes)),
        None => tracing::warn!("Persistence outcomes already taken, write failures will not be reported"),
    }

    tracing::info!("Ledger sync started against {} store", state.store.name());
    SyncHandle {
        tasks,
        store: state.store.clone(),
    }
}

/// Keep the local ledger equal to the shared table.
///
/// Every change notification triggers a full refetch.
pub fn spawn_ledger_sync(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Subscribe before the first fetch so nothing slips in between
        let mut changes = state.store.subscribe();
        if let Err(e) = state.refresh_ledger().await {
            tracing::warn!("Initial ledger fetch failed: {}", e);
        }

        loop {
            match changes.recv().await {
                Ok(change) => {
                    tracing::debug!("Ledger change ({:?}), refetching", change);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Missed {} ledger notifications, refetching", skipped);
                }
                Err(RecvError::Closed) => {
                    tracing::warn!("Ledger change feed closed");
                    break;
                }
            }
            if let Err(e) = state.refresh_ledger().await {
                tracing::warn!("Ledger refetch failed: {}", e);
            }
        }
    })
}

/// Turn write results into sync status and host-visible notices
pub fn spawn_persist_reporter(
    state: Arc<AppState>,
    mut outcomes: mpsc::UnboundedReceiver<PersistOutcome>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outcome) = outcomes.recv().await {
            match outcome.result {
                Ok(()) => {
                    tracing::debug!(
                        "Round {} ({}) saved to shared table",
                        outcome.round,
                        outcome.entrant_id
                    );
                    state.set_sync_status(SyncStatus::Online).await;
                }
                Err(error) => {
                    tracing::warn!(
                        "Round {} ({}) not saved to shared table: {}",
                        outcome.round,
                        outcome.entrant_id,
                        error
                    );
                    state
                        .set_sync_status(SyncStatus::Offline {
                            error: error.clone(),
                        })
                        .await;
                    state.broadcast_to_host(ServerMessage::SyncError {
                        round: outcome.round,
                        msg: error,
                    });
                }
            }
        }
    })
}
