//! Prize schedule: which sponsor gives what in each round.
//!
//! Rounds are 1-based. The schedule always holds exactly [`MAX_ROUNDS`]
//! slots; anything nobody supplied is the house default for that round.

use crate::columns::{cell_text, headers_of, PrizeColumns};
use crate::types::{PrizeSlot, Row, MAX_ROUNDS};
use serde::{Deserialize, Serialize};

/// Description used when a table row has no readable description cell
pub const MISSING_DESCRIPTION: &str = "No description";

/// Literal some spreadsheet exporters write for an empty cell
const UNDEFINED_CELL: &str = "undefined";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrizeSchedule {
    pub house_sponsor: String,
    slots: Vec<PrizeSlot>,
}

impl PrizeSchedule {
    /// A schedule where every round gets the house default
    pub fn new(house_sponsor: &str) -> Self {
        Self {
            house_sponsor: house_sponsor.to_string(),
            slots: (1..=MAX_ROUNDS)
                .map(|round| PrizeSlot::house_default(round, house_sponsor))
                .collect(),
        }
    }

    /// Parse the line-based prize editor format.
    ///
    /// `Sponsor (phone): description` per line; a line without `:` is a
    /// bare description for the house sponsor. Blank lines are skipped and
    /// lines past the round cap are ignored.
    pub fn parse_from_text(text: &str, house_sponsor: &str) -> Self {
        let mut schedule = Self::new(house_sponsor);

        let lines = text.lines().filter(|l| !l.trim().is_empty());
        for (slot, line) in schedule.slots.iter_mut().zip(lines) {
            *slot = parse_line(line, house_sponsor);
        }

        schedule
    }

    /// Apply prizes from spreadsheet rows onto this schedule.
    ///
    /// The supplied prizes overwrite rounds 1..=n; later rounds keep what
    /// they had. Returns how many prizes were applied (0 leaves the schedule
    /// untouched).
    pub fn merge_table(&mut self, rows: &[Row]) -> usize {
        let prizes = parse_table_rows(rows, &self.house_sponsor);
        let applied = prizes.len().min(MAX_ROUNDS);
        for (slot, prize) in self.slots.iter_mut().zip(prizes) {
            *slot = prize;
        }
        applied
    }

    /// The slot for a 1-based round, or the house default when out of range
    pub fn slot_for(&self, round: u32) -> PrizeSlot {
        let round = round as usize;
        round
            .checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
            .cloned()
            .unwrap_or_else(|| PrizeSlot::house_default(round, &self.house_sponsor))
    }

    /// Number of rounds whose slot differs from the house default
    pub fn configured_count(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter(|(idx, slot)| !self.is_default(*idx + 1, slot))
            .count()
    }

    /// Render back into the editor format, up to the last configured round
    pub fn to_text(&self) -> String {
        let last = self
            .slots
            .iter()
            .enumerate()
            .rposition(|(idx, slot)| !self.is_default(idx + 1, slot));

        let Some(last) = last else {
            return String::new();
        };

        self.slots[..=last]
            .iter()
            .map(|slot| match &slot.sponsor_phone {
                Some(phone) => format!("{} ({}): {}", slot.sponsor_name, phone, slot.description),
                None => format!("{}: {}", slot.sponsor_name, slot.description),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Repair a schedule loaded from disk: exactly `MAX_ROUNDS` slots
    pub fn normalized(mut self) -> Self {
        self.slots.truncate(MAX_ROUNDS);
        let start = self.slots.len();
        self.slots.extend(
            (start + 1..=MAX_ROUNDS).map(|round| PrizeSlot::house_default(round, &self.house_sponsor)),
        );
        self
    }

    fn is_default(&self, round: usize, slot: &PrizeSlot) -> bool {
        *slot == PrizeSlot::house_default(round, &self.house_sponsor)
    }
}

fn parse_line(line: &str, house_sponsor: &str) -> PrizeSlot {
    let Some((sponsor_part, rest)) = line.split_once(':') else {
        return PrizeSlot {
            sponsor_name: house_sponsor.to_string(),
            description: line.trim().to_string(),
            sponsor_phone: None,
        };
    };

    // Only the text up to a second ':' is the description
    let description = rest.split(':').next().unwrap_or_default().trim().to_string();
    let (sponsor_name, sponsor_phone) = split_sponsor_phone(sponsor_part.trim());

    PrizeSlot {
        sponsor_name,
        description,
        sponsor_phone,
    }
}

/// `Acme (555-1234)` -> (`Acme`, Some(`555-1234`))
fn split_sponsor_phone(sponsor: &str) -> (String, Option<String>) {
    if let Some(open) = sponsor.find('(') {
        if let Some(len) = sponsor[open + 1..].find(')') {
            let close = open + 1 + len;
            let phone = sponsor[open + 1..close].trim();
            if !phone.is_empty() {
                let name = format!("{}{}", &sponsor[..open], &sponsor[close + 1..]);
                return (name.trim().to_string(), Some(phone.to_string()));
            }
        }
    }
    (sponsor.to_string(), None)
}

/// Turn table rows into prizes using guessed columns; unusable rows are dropped
pub fn parse_table_rows(rows: &[Row], house_sponsor: &str) -> Vec<PrizeSlot> {
    let headers = headers_of(rows);
    if headers.is_empty() {
        return Vec::new();
    }
    let columns = PrizeColumns::guess(&headers);
    tracing::debug!("Prize table columns guessed: {:?}", columns);

    rows.iter()
        .map(|row| PrizeSlot {
            sponsor_name: cell_text(row, columns.sponsor.as_deref())
                .unwrap_or_else(|| house_sponsor.to_string()),
            description: cell_text(row, columns.description.as_deref())
                .unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
            sponsor_phone: cell_text(row, columns.phone.as_deref()),
        })
        .filter(|slot| !slot.description.is_empty() && slot.description != UNDEFINED_CELL)
        .collect()
}
