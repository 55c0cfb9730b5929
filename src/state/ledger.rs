use super::AppState;
use crate::protocol::ServerMessage;
use crate::store::StoreError;
use crate::types::*;
use std::collections::HashSet;

/// Record a completed draw; the ledger is kept newest first
pub(super) fn append(ledger: &mut Vec<WinnerRecord>, record: WinnerRecord) {
    ledger.insert(0, record);
}

impl AppState {
    /// Remember winners drawn here until the shared table returns them.
    /// Call with the ledger write lock held.
    pub(super) async fn mark_unconfirmed<'a>(&self, ids: impl Iterator<Item = &'a str>) {
        let mut unconfirmed = self.unconfirmed.write().await;
        unconfirmed.extend(ids.map(str::to_string));
    }

    pub async fn get_ledger(&self) -> Vec<WinnerRecord> {
        self.ledger.read().await.clone()
    }

    pub async fn winner_ids(&self) -> HashSet<EntrantId> {
        self.ledger
            .read()
            .await
            .iter()
            .map(|r| r.entrant.id.clone())
            .collect()
    }

    /// Next round number: one past the number of completed draws
    pub async fn next_round(&self) -> u32 {
        self.ledger.read().await.len() as u32 + 1
    }

    /// Swap in the authoritative winner list from the shared table.
    ///
    /// Local winners whose write has not shown up in the table yet are kept.
    pub async fn replace_ledger(&self, mut records: Vec<WinnerRecord>) {
        let mut ledger = self.ledger.write().await;
        let mut unconfirmed = self.unconfirmed.write().await;

        let seen: HashSet<&str> = records.iter().map(|r| r.entrant_id()).collect();
        unconfirmed.retain(|id| !seen.contains(id.as_str()));
        let pending: Vec<WinnerRecord> = ledger
            .iter()
            .filter(|r| unconfirmed.contains(r.entrant_id()))
            .cloned()
            .collect();
        drop(unconfirmed);

        let count = records.len();
        let kept = pending.len();
        records.extend(pending);
        records.sort_by(|a, b| b.round.cmp(&a.round));
        *ledger = records;
        drop(ledger);

        tracing::debug!("Ledger replaced with {} winners ({} local pending)", count, kept);
        self.broadcast_ledger().await;
        self.broadcast_draw_status().await;
    }

    /// Refetch the shared table. Failures flip the sync status to offline
    /// and leave the local ledger untouched.
    pub async fn refresh_ledger(&self) -> Result<usize, StoreError> {
        match self.store.select_all().await {
            Ok(records) => {
                let count = records.len();
                self.replace_ledger(records).await;
                self.set_sync_status(SyncStatus::Online).await;
                Ok(count)
            }
            Err(e) => {
                self.set_sync_status(SyncStatus::Offline {
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    pub async fn broadcast_ledger(&self) {
        let winners = self.get_ledger().await;
        self.broadcast_to_all(ServerMessage::Ledger { winners });
    }
}
