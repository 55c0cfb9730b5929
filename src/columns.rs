//! Best-effort column guessing for imported spreadsheets.
//!
//! Headers are matched by case-insensitive substring against synonym lists.
//! Nothing here ever fails: an unmatched column is simply `None` and callers
//! fall back to positional defaults. Imprecise matches are accepted as is.

use crate::types::Row;
use serde::{Deserialize, Serialize};

pub const SPONSOR_SYNONYMS: &[&str] = &[
    "business", "company", "sponsor", "brand", "negocio", "empresa", "marca",
];
pub const DESCRIPTION_SYNONYMS: &[&str] = &[
    "prize", "gift", "description", "premio", "regalo", "descripcion",
];
pub const PHONE_SYNONYMS: &[&str] = &[
    "cellphone", "phone", "tel", "whatsapp", "mobile", "celular", "fono",
];

pub const NAME_SYNONYMS: &[&str] = &["name", "nombre", "participant", "participante"];
pub const TICKET_SYNONYMS: &[&str] = &[
    "ticket", "code", "codigo", "entry", "folio", "boleto", "number",
];
pub const ASSIGNED_PRIZE_SYNONYMS: &[&str] = &["assigned", "asignado"];

/// Find the first header (in column order) containing any of the synonyms
pub fn match_column<'a>(headers: &'a [String], synonyms: &[&str]) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| {
            let lower = header.to_lowercase();
            synonyms.iter().any(|s| lower.contains(s))
        })
        .map(String::as_str)
}

/// Column names of the first row, in order
pub fn headers_of(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

/// Render a cell as trimmed text. Missing, null and blank cells are `None`.
pub fn cell_text(row: &Row, column: Option<&str>) -> Option<String> {
    let value = row.get(column?)?;
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Which participant column holds which field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantColumns {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub ticket: Option<String>,
    #[serde(default)]
    pub assigned_prize: Option<String>,
}

impl ParticipantColumns {
    /// Heuristic guess from header names alone.
    ///
    /// Each header serves at most one field. Fields are resolved most specific
    /// first, so "Phone Number" goes to phone before ticket sees "number".
    pub fn guess(headers: &[String]) -> Self {
        let mut taken: Vec<&str> = Vec::new();
        let mut pick = |synonyms: &[&str]| {
            let found = headers
                .iter()
                .filter(|h| !taken.contains(&h.as_str()))
                .find(|h| {
                    let lower = h.to_lowercase();
                    synonyms.iter().any(|s| lower.contains(s))
                })?;
            taken.push(found.as_str());
            Some(found.clone())
        };

        // Assigned-prize headers also contain "prize"-like words
        let assigned_prize = pick(ASSIGNED_PRIZE_SYNONYMS);
        let phone = pick(PHONE_SYNONYMS);
        let name = pick(NAME_SYNONYMS);
        let ticket = pick(TICKET_SYNONYMS);

        Self {
            name,
            phone,
            ticket,
            assigned_prize,
        }
    }

    /// Keep columns that exist in `headers`, fill the gaps from `fallback`
    pub fn merged_with(self, fallback: ParticipantColumns, headers: &[String]) -> Self {
        let known = |col: Option<String>| col.filter(|c| headers.iter().any(|h| h == c));
        Self {
            name: known(self.name).or(fallback.name),
            phone: known(self.phone).or(fallback.phone),
            ticket: known(self.ticket).or(fallback.ticket),
            assigned_prize: known(self.assigned_prize).or(fallback.assigned_prize),
        }
    }
}

/// Which prize-table column holds which field, with positional fallbacks applied
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeColumns {
    pub sponsor: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
}

impl PrizeColumns {
    /// Sponsor falls back to the first column, description to the last
    pub fn guess(headers: &[String]) -> Self {
        let sponsor = match_column(headers, SPONSOR_SYNONYMS).or(headers.first().map(String::as_str));
        let description =
            match_column(headers, DESCRIPTION_SYNONYMS).or(headers.last().map(String::as_str));
        let phone = match_column(headers, PHONE_SYNONYMS);

        Self {
            sponsor: sponsor.map(str::to_string),
            description: description.map(str::to_string),
            phone: phone.map(str::to_string),
        }
    }
}
