mod memory;
mod rest;

use crate::types::WinnerRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub use memory::MemoryLedgerStore;
pub use rest::RestLedgerStore;

/// Result type for ledger store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur talking to the winners table
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Ledger store unreachable: {0}")]
    Unavailable(String),

    #[error("Ledger store rejected request: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Kind of change observed on the winners table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerChange {
    Insert,
    Update,
    Delete,
}

/// The shared winners table.
///
/// Treated as an at-least-once, eventually consistent append log. Duplicate
/// inserts (same entrant id) are the store's business to ignore.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one completed draw
    async fn insert(&self, record: &WinnerRecord) -> StoreResult<()>;

    /// Every record, newest round first
    async fn select_all(&self) -> StoreResult<Vec<WinnerRecord>>;

    /// Change notifications; each one means "refetch everything"
    fn subscribe(&self) -> broadcast::Receiver<LedgerChange>;

    /// Get the name of this store
    fn name(&self) -> &str;

    /// Stop any background work the store runs
    async fn shutdown(&self) {}
}

/// Configuration for the winners table
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of a PostgREST-compatible API (None = in-memory only)
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
    /// How often the REST store polls for outside changes
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: "winners".to_string(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            std::env::var(key).ok().and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };
        let defaults = Self::default();

        Self {
            url: non_empty("LEDGER_URL").map(|u| u.trim_end_matches('/').to_string()),
            api_key: non_empty("LEDGER_API_KEY"),
            table: non_empty("LEDGER_TABLE").unwrap_or(defaults.table),
            poll_interval: non_empty("LEDGER_POLL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            request_timeout: non_empty("LEDGER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Build the configured store, falling back to an in-memory one
    pub fn build_store(&self) -> StoreResult<Arc<dyn LedgerStore>> {
        match &self.url {
            Some(url) => {
                let store = RestLedgerStore::new(
                    url.clone(),
                    self.api_key.clone(),
                    self.table.clone(),
                    self.poll_interval,
                    self.request_timeout,
                )?;
                Ok(Arc::new(store))
            }
            None => {
                tracing::warn!("LEDGER_URL not set, winners are kept in memory only");
                Ok(Arc::new(MemoryLedgerStore::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "LEDGER_URL",
            "LEDGER_API_KEY",
            "LEDGER_TABLE",
            "LEDGER_POLL_SECS",
            "LEDGER_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_default_config_from_empty_env() {
        clear_env();
        let config = StoreConfig::from_env();
        assert!(config.url.is_none());
        assert_eq!(config.table, "winners");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        std::env::set_var("LEDGER_URL", "https://db.example.org/");
        std::env::set_var("LEDGER_TABLE", "  raffle_winners ");
        std::env::set_var("LEDGER_POLL_SECS", "not-a-number");
        std::env::set_var("LEDGER_TIMEOUT_SECS", "3");

        let config = StoreConfig::from_env();
        assert_eq!(config.url.as_deref(), Some("https://db.example.org"));
        assert_eq!(config.table, "raffle_winners");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_url_means_memory_store() {
        clear_env();
        std::env::set_var("LEDGER_URL", "   ");
        let store = StoreConfig::from_env().build_store().unwrap();
        assert_eq!(store.name(), "memory");
        clear_env();
    }
}
