//! WebSocket message dispatch
//!
//! Authorization is checked here, then host commands go to the host module.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::host;

pub const PROTOCOL_VERSION: &str = "1.0";

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($role:expr, $action:expr) => {
        if *$role != Role::Host {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only host can {}", $action),
            });
        }
    };
}

/// Full state for a freshly connected (or resyncing) screen
pub async fn welcome(state: &Arc<AppState>, role: &Role) -> ServerMessage {
    ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role: role.clone(),
        status: state.draw_status().await,
        sync: state.get_sync_status().await,
        winners: state.get_ledger().await,
        prizes_text: state.schedule.read().await.to_text(),
        server_now: chrono::Utc::now().to_rfc3339(),
    }
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::RequestState => Some(welcome(state, role).await),

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::HostImportParticipants { rows } => {
            check_host!(role, "import participants");
            host::handle_import_participants(state, rows).await
        }

        ClientMessage::HostImportPrizesText { text } => {
            check_host!(role, "import prizes");
            host::handle_import_prizes_text(state, text).await
        }

        ClientMessage::HostImportPrizesTable { rows } => {
            check_host!(role, "import prizes");
            host::handle_import_prizes_table(state, rows).await
        }

        ClientMessage::HostClearRoster => {
            check_host!(role, "clear participants");
            host::handle_clear_roster(state).await
        }

        ClientMessage::HostStartDraw => {
            check_host!(role, "start draws");
            host::handle_start_draw(state).await
        }

        ClientMessage::HostAcknowledge => {
            check_host!(role, "acknowledge winners");
            host::handle_acknowledge(state).await
        }

        ClientMessage::HostResetAll => {
            check_host!(role, "reset");
            host::handle_reset_all(state).await
        }

        ClientMessage::HostSearchParticipants { query } => {
            check_host!(role, "search participants");
            host::handle_search_participants(state, query).await
        }

        ClientMessage::HostRefreshLedger => {
            check_host!(role, "refresh the ledger");
            host::handle_refresh_ledger(state).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DrawPhase;
    use serde_json::json;

    fn rows(value: serde_json::Value) -> Vec<crate::types::Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[tokio::test]
    async fn test_unauthorized_host_command() {
        let state = Arc::new(AppState::new());

        for msg in [
            ClientMessage::HostStartDraw,
            ClientMessage::HostClearRoster,
            ClientMessage::HostResetAll,
        ] {
            let result = handle_message(msg, &Role::Display, &state).await;
            match result {
                Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
                other => panic!("Expected UNAUTHORIZED, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_display_can_request_state() {
        let state = Arc::new(AppState::new());
        let result = handle_message(ClientMessage::RequestState, &Role::Display, &state).await;

        match result {
            Some(ServerMessage::Welcome { role, status, .. }) => {
                assert_eq!(role, Role::Display);
                assert_eq!(status.phase, DrawPhase::Idle);
            }
            other => panic!("Expected Welcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_host_import_participants() {
        let state = Arc::new(AppState::new());
        let result = handle_message(
            ClientMessage::HostImportParticipants {
                rows: rows(json!([{"Name": "Ana"}, {"Name": "Bea"}])),
            },
            &Role::Host,
            &state,
        )
        .await;

        match result {
            Some(ServerMessage::ParticipantsImported { imported, counts }) => {
                assert_eq!(imported, 2);
                assert_eq!(counts.eligible, 2);
            }
            other => panic!("Expected ParticipantsImported, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_host_import_prizes_text() {
        let state = Arc::new(AppState::new());
        let result = handle_message(
            ClientMessage::HostImportPrizesText {
                text: "Acme (555-1234): Free Coffee\nJust a plain prize".to_string(),
            },
            &Role::Host,
            &state,
        )
        .await;

        match result {
            Some(ServerMessage::Schedule {
                configured,
                applied,
                ..
            }) => {
                assert_eq!(configured, 2);
                assert_eq!(applied, Some(2));
            }
            other => panic!("Expected Schedule, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unusable_prize_table_is_error() {
        let state = Arc::new(AppState::new());
        let result = handle_message(
            ClientMessage::HostImportPrizesTable {
                rows: rows(json!([{"Sponsor": "Acme", "Prize": "undefined"}])),
            },
            &Role::Host,
            &state,
        )
        .await;

        assert!(matches!(result, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_start_draw_with_empty_roster_returns_idle() {
        let state = Arc::new(AppState::new());
        let result = handle_message(ClientMessage::HostStartDraw, &Role::Host, &state).await;

        match result {
            Some(ServerMessage::Draw { status }) => assert_eq!(status.phase, DrawPhase::Idle),
            other => panic!("Expected Draw, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_participants() {
        let state = Arc::new(AppState::new());
        state
            .import_participants(rows(json!([{"Name": "Ana"}, {"Name": "Bea"}])))
            .await
            .unwrap();

        let result = handle_message(
            ClientMessage::HostSearchParticipants {
                query: "be".to_string(),
            },
            &Role::Host,
            &state,
        )
        .await;

        match result {
            Some(ServerMessage::HostParticipants { list }) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].name, "Bea");
            }
            other => panic!("Expected HostParticipants, got {:?}", other),
        }
    }
}
