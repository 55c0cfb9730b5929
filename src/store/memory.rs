use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-process winners table.
///
/// Used when no remote table is configured and in tests. `set_reachable`
/// simulates a connectivity outage.
pub struct MemoryLedgerStore {
    records: RwLock<Vec<WinnerRecord>>,
    changes: broadcast::Sender<LedgerChange>,
    reachable: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(64);
        Self {
            records: RwLock::new(Vec::new()),
            changes,
            reachable: AtomicBool::new(true),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delete a record by entrant id, as another client or an admin might
    pub async fn remove(&self, entrant_id: &str) -> bool {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.entrant_id() != entrant_id);
        let removed = records.len() != before;
        drop(records);

        if removed {
            let _ = self.changes.send(LedgerChange::Delete);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked unreachable".to_string()))
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert(&self, record: &WinnerRecord) -> StoreResult<()> {
        self.check_reachable()?;

        let mut records = self.records.write().await;
        if records.iter().any(|r| r.entrant_id() == record.entrant_id()) {
            tracing::debug!("Ignoring duplicate insert for {}", record.entrant_id());
            return Ok(());
        }
        records.push(record.clone());
        drop(records);

        // No subscribers is fine
        let _ = self.changes.send(LedgerChange::Insert);
        Ok(())
    }

    async fn select_all(&self) -> StoreResult<Vec<WinnerRecord>> {
        self.check_reachable()?;

        let mut records = self.records.read().await.clone();
        records.sort_by(|a, b| b.round.cmp(&a.round));
        Ok(records)
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerChange> {
        self.changes.subscribe()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entrant, PrizeSlot};

    fn record(id: &str, round: u32) -> WinnerRecord {
        let entrant = Entrant {
            id: id.to_string(),
            name: format!("Name {}", id),
            phone: String::new(),
            entry_code: id.to_string(),
            assigned_prize: None,
            imported_on: None,
        };
        WinnerRecord::stamp(entrant, round, &PrizeSlot::house_default(round as usize, "House"), true)
    }

    #[tokio::test]
    async fn test_select_all_is_newest_first() {
        let store = MemoryLedgerStore::new();
        store.insert(&record("a", 1)).await.unwrap();
        store.insert(&record("b", 2)).await.unwrap();

        let rounds: Vec<u32> = store.select_all().await.unwrap().iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_ignored() {
        let store = MemoryLedgerStore::new();
        let mut rx = store.subscribe();

        store.insert(&record("a", 1)).await.unwrap();
        store.insert(&record("a", 1)).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(rx.recv().await.unwrap(), LedgerChange::Insert);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_store_errors() {
        let store = MemoryLedgerStore::new();
        store.set_reachable(false);

        assert!(matches!(
            store.insert(&record("a", 1)).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.select_all().await.is_err());

        store.set_reachable(true);
        assert!(store.select_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_notifies() {
        let store = MemoryLedgerStore::new();
        store.insert(&record("a", 1)).await.unwrap();
        let mut rx = store.subscribe();

        assert!(store.remove("a").await);
        assert!(!store.remove("a").await);
        assert_eq!(rx.recv().await.unwrap(), LedgerChange::Delete);
    }
}
