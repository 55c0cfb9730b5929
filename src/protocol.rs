use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a full state refresh (any role)
    RequestState,
    // Host-only messages
    /// Replace the participant list with decoded spreadsheet rows
    HostImportParticipants {
        rows: Vec<Row>,
    },
    /// Replace the prize schedule from the line-based editor
    HostImportPrizesText {
        text: String,
    },
    /// Apply prizes from decoded spreadsheet rows
    HostImportPrizesTable {
        rows: Vec<Row>,
    },
    HostClearRoster,
    HostStartDraw,
    /// Dismiss the revealed winner and move on to the next round
    HostAcknowledge,
    /// Forget roster, prizes and local winners (shared table is untouched)
    HostResetAll,
    HostSearchParticipants {
        query: String,
    },
    /// Refetch the shared winners table now
    HostRefreshLedger,
}

/// Participant totals for display
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RosterCounts {
    pub total: usize,
    pub eligible: usize,
    pub winners: usize,
}

/// Everything a screen needs to render the draw
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawStatus {
    pub phase: DrawPhase,
    pub current_round: u32,
    pub active_prize: PrizeSlot,
    /// Name currently flashing on screen while spinning
    pub spin_name: Option<String>,
    pub current_winner: Option<WinnerRecord>,
    pub counts: RosterCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent on connect and in answer to `request_state`
    Welcome {
        protocol: String,
        role: Role,
        status: DrawStatus,
        sync: SyncStatus,
        /// Winners, newest first
        winners: Vec<WinnerRecord>,
        prizes_text: String,
        server_now: String,
    },
    Draw {
        status: DrawStatus,
    },
    /// One cosmetic flip of the spinner
    SpinTick {
        name: String,
        tick: u32,
        ticks: u32,
    },
    /// A winner was drawn; screens fire the celebration
    WinnerRevealed {
        winner: WinnerRecord,
    },
    /// Winners, newest first
    Ledger {
        winners: Vec<WinnerRecord>,
    },
    Roster {
        counts: RosterCounts,
    },
    ParticipantsImported {
        imported: usize,
        counts: RosterCounts,
    },
    /// Host-only: participant search results
    HostParticipants {
        list: Vec<Entrant>,
    },
    Schedule {
        /// Editor text for the configured rounds
        prizes_text: String,
        configured: usize,
        /// How many prizes the triggering import applied, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        applied: Option<usize>,
    },
    Sync {
        status: SyncStatus,
    },
    /// A winner could not be written to the shared table (non-fatal)
    SyncError {
        round: u32,
        msg: String,
    },
    Error {
        code: String,
        msg: String,
    },
}
