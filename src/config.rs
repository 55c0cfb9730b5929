use crate::types::{DrawConfig, DEFAULT_HOUSE_SPONSOR};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server settings read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Roster/schedule snapshot file
    pub snapshot_path: PathBuf,
    pub draw: DrawConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6573)),
            snapshot_path: PathBuf::from("data/snapshot.json"),
            draw: DrawConfig::default(),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a variable, warning and falling back when it does not parse
fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match non_empty(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

fn flag(key: &str, default: bool) -> bool {
    match non_empty(key).map(|v| v.to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        Some(other) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, other);
            default
        }
        None => default,
    }
}

impl AppConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let draw = DrawConfig {
            spin_ticks: parsed("DRAW_SPIN_TICKS", defaults.draw.spin_ticks),
            tick_interval_ms: parsed("DRAW_TICK_MS", defaults.draw.tick_interval_ms),
            honor_assigned_prize: flag("HONOR_ASSIGNED_PRIZE", defaults.draw.honor_assigned_prize),
            house_sponsor: non_empty("HOUSE_SPONSOR")
                .unwrap_or_else(|| DEFAULT_HOUSE_SPONSOR.to_string()),
        };

        Self {
            bind_addr: parsed("BIND_ADDR", defaults.bind_addr),
            snapshot_path: non_empty("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            draw,
        }
    }
}
