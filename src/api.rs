//! HTTP API endpoints for exports and state restoration.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::export::{export_csv, export_rows, WinnerExportRow};
use crate::state::export::StateExport;
use crate::state::AppState;

/// Winners in spreadsheet shape, newest first.
///
/// GET /api/winners/export
pub async fn export_winners(State(state): State<Arc<AppState>>) -> Json<Vec<WinnerExportRow>> {
    let ledger = state.get_ledger().await;
    Json(export_rows(&ledger))
}

/// Winners as a CSV download for the organizers' spreadsheet.
///
/// GET /api/winners/export.csv
pub async fn export_winners_csv(State(state): State<Arc<AppState>>) -> Response {
    let ledger = state.get_ledger().await;
    match export_csv(&ledger) {
        Ok(body) => {
            let filename = format!(
                "attachment; filename=\"winners_{}.csv\"",
                chrono::Local::now().format("%Y-%m-%d")
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, filename),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Winner CSV export failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Export failed: {}", e)).into_response()
        }
    }
}

/// Export roster, schedule and ledger as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<StateExport> {
    let export = state.export_state().await;
    Json(export)
}

/// Import a state export.
///
/// POST /api/state/import
///
/// Replaces roster, schedule and local ledger and broadcasts the new state
/// to all connected screens.
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<StateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e)).into_response()
        }
    }
}
