//! Winner list export for the organizers' spreadsheet.

use crate::types::WinnerRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder for a sponsor without a phone number
pub const NO_PHONE: &str = "N/A";

/// Header line of the CSV download, same order as [`WinnerExportRow`]
pub const CSV_HEADERS: [&str; 7] = [
    "round",
    "name",
    "phone",
    "ticket",
    "prize",
    "sponsor",
    "sponsor_phone",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer flush failed: {0}")]
    Flush(String),
}

/// One exported winner, columns in spreadsheet order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WinnerExportRow {
    pub round: u32,
    pub name: String,
    pub phone: String,
    pub ticket: String,
    pub prize: String,
    pub sponsor: String,
    pub sponsor_phone: String,
}

impl From<&WinnerRecord> for WinnerExportRow {
    fn from(record: &WinnerRecord) -> Self {
        Self {
            round: record.round,
            name: record.entrant.name.clone(),
            phone: record.entrant.phone.clone(),
            ticket: record.entrant.entry_code.clone(),
            prize: record.prize.clone(),
            sponsor: record.sponsor.clone(),
            sponsor_phone: record
                .sponsor_phone
                .clone()
                .unwrap_or_else(|| NO_PHONE.to_string()),
        }
    }
}

/// Rows in ledger order (newest first)
pub fn export_rows(ledger: &[WinnerRecord]) -> Vec<WinnerExportRow> {
    ledger.iter().map(WinnerExportRow::from).collect()
}

/// The same rows as a CSV document. The header line is always present.
pub fn export_csv(ledger: &[WinnerRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for row in export_rows(ledger) {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))
}
