//! Full state export/import for restoring a draw during a live event.

use super::AppState;
use crate::protocol::ServerMessage;
use crate::schedule::PrizeSchedule;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Schema version for export format compatibility
/// Version 1: roster, schedule and ledger
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable copy of everything the host has configured or drawn.
///
/// Excludes runtime-only components:
/// - Broadcast channels (recreated at startup)
/// - The in-flight spin (never exported)
/// - Store and LLM credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub roster: Vec<Entrant>,
    pub schedule: PrizeSchedule,
    /// Winners, newest first
    #[serde(default)]
    pub ledger: Vec<WinnerRecord>,
}

impl StateExport {
    pub fn new(roster: Vec<Entrant>, schedule: PrizeSchedule, ledger: Vec<WinnerRecord>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            roster,
            schedule,
            ledger,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        let mut entrant_ids = HashSet::new();
        for entrant in &self.roster {
            if !entrant_ids.insert(entrant.id.as_str()) {
                return Err(format!("Entrant '{}' appears twice in the roster", entrant.id));
            }
        }

        let mut winner_ids = HashSet::new();
        let mut rounds = HashSet::new();
        for record in &self.ledger {
            if !winner_ids.insert(record.entrant_id()) {
                return Err(format!(
                    "Entrant '{}' won more than once",
                    record.entrant_id()
                ));
            }
            if record.round == 0 || !rounds.insert(record.round) {
                return Err(format!("Round {} is invalid or duplicated", record.round));
            }
        }

        // Rounds must be exactly 1..=n
        if let Some(max) = rounds.iter().max() {
            if *max as usize != rounds.len() {
                return Err(format!(
                    "Ledger rounds have gaps: {} winners but highest round is {}",
                    rounds.len(),
                    max
                ));
            }
        }

        Ok(())
    }
}

impl AppState {
    pub async fn export_state(&self) -> StateExport {
        StateExport::new(
            self.roster.read().await.clone(),
            self.schedule.read().await.clone(),
            self.ledger.read().await.clone(),
        )
    }

    /// Replace roster, schedule and local ledger with an export.
    ///
    /// Refused while a spin is running. Imported winners are also written to
    /// the shared table; records it already holds are ignored there.
    pub async fn import_state(&self, export: StateExport) -> Result<(), String> {
        export.validate()?;

        let mut engine = self.engine.write().await;
        if engine.phase == DrawPhase::Spinning {
            return Err("Cannot import state while a draw is spinning".to_string());
        }
        engine.abort();

        let mut ledger = export.ledger;
        ledger.sort_by(|a, b| b.round.cmp(&a.round));
        let winners = ledger.len();
        *self.roster.write().await = export.roster;
        *self.schedule.write().await = export.schedule.normalized();
        let mut local = self.ledger.write().await;
        *local = ledger.clone();
        self.mark_unconfirmed(ledger.iter().map(|r| r.entrant_id())).await;
        drop(local);
        drop(engine);

        tracing::info!(
            "State imported from {}: {} winners restored",
            export.exported_at,
            winners
        );

        // Oldest first so the shared table fills in round order
        for record in ledger.into_iter().rev() {
            self.spawn_persist(record);
        }

        self.persist_snapshot().await;
        self.broadcast_schedule(None).await;
        self.broadcast_ledger().await;
        let counts = self.roster_counts().await;
        self.broadcast_to_all(ServerMessage::Roster { counts });
        self.broadcast_draw_status().await;
        Ok(())
    }
}
