use super::AppState;
use crate::protocol::{RosterCounts, ServerMessage};
use crate::types::*;
use std::collections::HashSet;

/// Entrants that have not won yet, in roster order.
///
/// Always derived from the current roster and ledger, never cached.
pub fn eligible<'a>(
    roster: &'a [Entrant],
    winner_ids: &'a HashSet<EntrantId>,
) -> impl Iterator<Item = &'a Entrant> + 'a {
    roster.iter().filter(move |e| !winner_ids.contains(&e.id))
}

impl AppState {
    /// Replace the participant list wholesale. Empty input is ignored.
    pub async fn replace_roster(&self, entrants: Vec<Entrant>) -> Result<usize, String> {
        if entrants.is_empty() {
            tracing::debug!("Ignoring roster replacement with no entrants");
            return Ok(0);
        }

        // Holding the engine lock keeps a spin from starting mid-replacement
        let engine = self.engine.read().await;
        if engine.phase == DrawPhase::Spinning {
            return Err("Cannot replace participants while a draw is spinning".to_string());
        }
        let count = entrants.len();
        *self.roster.write().await = entrants;
        drop(engine);

        tracing::info!("Roster replaced with {} entrants", count);
        self.after_roster_change().await;
        Ok(count)
    }

    /// Empty the roster, aborting any draw in progress first
    pub async fn clear_roster(&self) {
        let mut engine = self.engine.write().await;
        let cancelled = engine.abort();
        self.roster.write().await.clear();
        drop(engine);

        if cancelled {
            tracing::warn!("Roster cleared during a spin, draw aborted");
        }
        tracing::info!("Roster cleared");
        self.after_roster_change().await;
    }

    pub async fn get_roster(&self) -> Vec<Entrant> {
        self.roster.read().await.clone()
    }

    /// Entrants still in the running
    pub async fn eligible_entrants(&self) -> Vec<Entrant> {
        let winner_ids = self.winner_ids().await;
        let roster = self.roster.read().await;
        eligible(&roster, &winner_ids).cloned().collect()
    }

    /// Case-insensitive search on name or entry code; empty query lists everyone
    pub async fn search_roster(&self, query: &str) -> Vec<Entrant> {
        let needle = query.trim().to_lowercase();
        self.roster
            .read()
            .await
            .iter()
            .filter(|e| {
                needle.is_empty()
                    || e.name.to_lowercase().contains(&needle)
                    || e.entry_code.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub async fn roster_counts(&self) -> RosterCounts {
        let winner_ids = self.winner_ids().await;
        let roster = self.roster.read().await;
        RosterCounts {
            total: roster.len(),
            eligible: eligible(&roster, &winner_ids).count(),
            winners: winner_ids.len(),
        }
    }

    async fn after_roster_change(&self) {
        self.persist_snapshot().await;
        let counts = self.roster_counts().await;
        self.broadcast_to_all(ServerMessage::Roster { counts });
        self.broadcast_draw_status().await;
    }
}
