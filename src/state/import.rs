use super::AppState;
use crate::columns::{cell_text, headers_of, ParticipantColumns};
use crate::protocol::ServerMessage;
use crate::schedule::PrizeSchedule;
use crate::types::*;

const ANONYMOUS: &str = "Anonymous";

/// Map decoded rows to entrants. Ids are `p-<batch>-<row index>`.
pub fn build_entrants(
    rows: &[Row],
    columns: &ParticipantColumns,
    batch: &str,
    imported_on: &str,
) -> Vec<Entrant> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| Entrant {
            id: format!("p-{}-{}", batch, idx),
            name: cell_text(row, columns.name.as_deref()).unwrap_or_else(|| ANONYMOUS.to_string()),
            phone: cell_text(row, columns.phone.as_deref()).unwrap_or_default(),
            entry_code: cell_text(row, columns.ticket.as_deref()).unwrap_or_else(|| idx.to_string()),
            assigned_prize: cell_text(row, columns.assigned_prize.as_deref()),
            imported_on: Some(imported_on.to_string()),
        })
        .collect()
}

impl AppState {
    /// Replace the roster from spreadsheet rows.
    ///
    /// Returns the number of entrants imported; an empty row list is a no-op.
    pub async fn import_participants(&self, rows: Vec<Row>) -> Result<usize, String> {
        if rows.is_empty() {
            tracing::debug!("Participant import with no rows ignored");
            return Ok(0);
        }
        let headers = headers_of(&rows);
        if headers.is_empty() {
            return Err("Imported rows have no columns".to_string());
        }

        let columns = self.resolve_participant_columns(&headers).await;
        let batch = ulid::Ulid::new().to_string();
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let entrants = build_entrants(&rows, &columns, &batch, &today);

        tracing::info!(
            "Importing {} participants (batch {}) using columns {:?}",
            entrants.len(),
            batch,
            columns
        );
        self.replace_roster(entrants).await
    }

    /// Ask the LLM mapper first; fall back to the header heuristics
    async fn resolve_participant_columns(&self, headers: &[String]) -> ParticipantColumns {
        let guessed = ParticipantColumns::guess(headers);
        let Some(mapper) = &self.column_mapper else {
            return guessed;
        };

        match mapper.map_columns(headers).await {
            Ok(mapped) => mapped.merged_with(guessed, headers),
            Err(e) => {
                tracing::warn!("LLM column mapping failed, using header matching: {}", e);
                guessed
            }
        }
    }

    /// Replace the whole schedule from the prize editor text.
    ///
    /// Returns how many rounds ended up configured.
    pub async fn import_prizes_text(&self, text: &str) -> usize {
        let schedule = PrizeSchedule::parse_from_text(text, &self.config.house_sponsor);
        let configured = schedule.configured_count();
        *self.schedule.write().await = schedule;

        tracing::info!("Prize schedule replaced, {} rounds configured", configured);
        self.after_schedule_change(Some(configured)).await;
        configured
    }

    /// Apply prizes from spreadsheet rows onto rounds 1..=n.
    ///
    /// Returns how many prizes were applied; 0 leaves the schedule untouched.
    pub async fn import_prizes_table(&self, rows: &[Row]) -> usize {
        let applied = self.schedule.write().await.merge_table(rows);
        if applied == 0 {
            tracing::debug!("Prize table import produced no prizes");
            return 0;
        }

        tracing::info!("Applied {} prizes from table", applied);
        self.after_schedule_change(Some(applied)).await;
        applied
    }

    pub async fn broadcast_schedule(&self, applied: Option<usize>) {
        let schedule = self.schedule.read().await;
        let msg = ServerMessage::Schedule {
            prizes_text: schedule.to_text(),
            configured: schedule.configured_count(),
            applied,
        };
        drop(schedule);
        self.broadcast_to_all(msg);
    }

    async fn after_schedule_change(&self, applied: Option<usize>) {
        self.persist_snapshot().await;
        self.broadcast_schedule(applied).await;
        self.broadcast_draw_status().await;
    }
}
