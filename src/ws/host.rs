//! Host-only command handlers
//!
//! All handlers in this module require the Host role.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Row;
use std::sync::Arc;

pub async fn handle_import_participants(
    state: &Arc<AppState>,
    rows: Vec<Row>,
) -> Option<ServerMessage> {
    tracing::info!("Host importing {} participant rows", rows.len());
    match state.import_participants(rows).await {
        Ok(imported) => Some(ServerMessage::ParticipantsImported {
            imported,
            counts: state.roster_counts().await,
        }),
        Err(e) => Some(ServerMessage::Error {
            code: "IMPORT_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_import_prizes_text(state: &Arc<AppState>, text: String) -> Option<ServerMessage> {
    let configured = state.import_prizes_text(&text).await;
    Some(schedule_message(state, Some(configured)).await)
}

pub async fn handle_import_prizes_table(
    state: &Arc<AppState>,
    rows: Vec<Row>,
) -> Option<ServerMessage> {
    tracing::info!("Host importing {} prize rows", rows.len());
    let applied = state.import_prizes_table(&rows).await;
    if applied == 0 && !rows.is_empty() {
        return Some(ServerMessage::Error {
            code: "IMPORT_FAILED".to_string(),
            msg: "No usable prizes found in the table".to_string(),
        });
    }
    Some(schedule_message(state, Some(applied)).await)
}

pub async fn handle_clear_roster(state: &Arc<AppState>) -> Option<ServerMessage> {
    tracing::info!("Host clearing roster");
    state.clear_roster().await;
    Some(ServerMessage::Roster {
        counts: state.roster_counts().await,
    })
}

pub async fn handle_start_draw(state: &Arc<AppState>) -> Option<ServerMessage> {
    let status = state.start_draw().await;
    Some(ServerMessage::Draw { status })
}

pub async fn handle_acknowledge(state: &Arc<AppState>) -> Option<ServerMessage> {
    let status = state.acknowledge().await;
    Some(ServerMessage::Draw { status })
}

pub async fn handle_reset_all(state: &Arc<AppState>) -> Option<ServerMessage> {
    tracing::warn!("Host resetting all local state");
    state.reset_all().await;
    Some(ServerMessage::Draw {
        status: state.draw_status().await,
    })
}

pub async fn handle_search_participants(
    state: &Arc<AppState>,
    query: String,
) -> Option<ServerMessage> {
    let list = state.search_roster(&query).await;
    Some(ServerMessage::HostParticipants { list })
}

pub async fn handle_refresh_ledger(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.refresh_ledger().await {
        Ok(_) => Some(ServerMessage::Ledger {
            winners: state.get_ledger().await,
        }),
        Err(e) => Some(ServerMessage::Error {
            code: "LEDGER_OFFLINE".to_string(),
            msg: e.to_string(),
        }),
    }
}

async fn schedule_message(state: &Arc<AppState>, applied: Option<usize>) -> ServerMessage {
    let schedule = state.schedule.read().await;
    ServerMessage::Schedule {
        prizes_text: schedule.to_text(),
        configured: schedule.configured_count(),
        applied,
    }
}
