use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque ID type
pub type EntrantId = String;

/// One imported spreadsheet row: column name -> cell value, in column order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Hard cap on the number of scheduled rounds
pub const MAX_ROUNDS: usize = 200;

/// Sponsor credited for rounds without a scheduled prize
pub const DEFAULT_HOUSE_SPONSOR: &str = "default-house-sponsor";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entrant {
    pub id: EntrantId,
    pub name: String,
    pub phone: String,
    /// Ticket number or business code printed on the entry
    pub entry_code: String,
    /// Per-entrant prize that overrides the round's scheduled description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_prize: Option<String>,
    /// Import date (informational only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_on: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrizeSlot {
    pub sponsor_name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_phone: Option<String>,
}

impl PrizeSlot {
    /// Slot used for a round nobody scheduled a prize for
    pub fn house_default(round: usize, house_sponsor: &str) -> Self {
        Self {
            sponsor_name: house_sponsor.to_string(),
            description: format!("Prize #{}", round),
            sponsor_phone: None,
        }
    }
}

/// A completed draw. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WinnerRecord {
    #[serde(flatten)]
    pub entrant: Entrant,
    /// RFC 3339 timestamp of the reveal
    pub won_at: String,
    pub round: u32,
    pub prize: String,
    pub sponsor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_phone: Option<String>,
}

impl WinnerRecord {
    /// Stamp an entrant as the winner of `round`.
    ///
    /// The sponsor always comes from the slot; the prize description comes
    /// from the entrant's own assignment when `honor_assigned_prize` is set.
    pub fn stamp(entrant: Entrant, round: u32, slot: &PrizeSlot, honor_assigned_prize: bool) -> Self {
        let prize = match (&entrant.assigned_prize, honor_assigned_prize) {
            (Some(assigned), true) if !assigned.trim().is_empty() => assigned.trim().to_string(),
            _ => slot.description.clone(),
        };

        Self {
            entrant,
            won_at: chrono::Utc::now().to_rfc3339(),
            round,
            prize,
            sponsor: slot.sponsor_name.clone(),
            sponsor_phone: slot.sponsor_phone.clone(),
        }
    }

    pub fn entrant_id(&self) -> &str {
        &self.entrant.id
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawPhase {
    #[default]
    Idle,
    Spinning,
    Revealed,
}

/// Connectivity of the external winners table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Connecting,
    Online,
    Offline { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Display,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawConfig {
    /// Number of cosmetic name flips before the winner is picked
    pub spin_ticks: u32,
    /// Delay between two flips
    pub tick_interval_ms: u64,
    /// Whether an entrant's assigned prize beats the scheduled description
    pub honor_assigned_prize: bool,
    pub house_sponsor: String,
}

impl DrawConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            spin_ticks: 40,
            tick_interval_ms: 60,
            honor_assigned_prize: true,
            house_sponsor: DEFAULT_HOUSE_SPONSOR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entrant(assigned: Option<&str>) -> Entrant {
        Entrant {
            id: "p-1".to_string(),
            name: "Ana".to_string(),
            phone: "555".to_string(),
            entry_code: "T-1".to_string(),
            assigned_prize: assigned.map(str::to_string),
            imported_on: None,
        }
    }

    fn slot() -> PrizeSlot {
        PrizeSlot {
            sponsor_name: "Acme".to_string(),
            description: "Mug".to_string(),
            sponsor_phone: Some("555-1234".to_string()),
        }
    }

    #[test]
    fn test_stamp_uses_slot_without_override() {
        let record = WinnerRecord::stamp(entrant(None), 3, &slot(), true);
        assert_eq!(record.round, 3);
        assert_eq!(record.prize, "Mug");
        assert_eq!(record.sponsor, "Acme");
        assert_eq!(record.sponsor_phone.as_deref(), Some("555-1234"));
    }

    #[test]
    fn test_assigned_prize_wins_but_sponsor_stays() {
        let record = WinnerRecord::stamp(entrant(Some("Bike")), 1, &slot(), true);
        assert_eq!(record.prize, "Bike");
        assert_eq!(record.sponsor, "Acme");
    }

    #[test]
    fn test_assigned_prize_ignored_when_disabled() {
        let record = WinnerRecord::stamp(entrant(Some("Bike")), 1, &slot(), false);
        assert_eq!(record.prize, "Mug");
    }

    #[test]
    fn test_winner_record_flattens_entrant() {
        let record = WinnerRecord::stamp(entrant(None), 1, &slot(), true);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "Ana");
        assert_eq!(json["entry_code"], "T-1");
        assert_eq!(json["round"], 1);
    }

    #[test]
    fn test_sync_status_tagging() {
        let json = serde_json::to_string(&SyncStatus::Offline {
            error: "down".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"offline","error":"down"}"#);
    }
}
