use std::str::FromStr;
use std::time::Duration;

use crate::matching::mood::MoodTable;

/// Realtime core configuration, loaded once from environment variables at
/// startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Search radius used by `POST /nearby` when the caller sends none.
    pub nearby_radius_meters: f64,
    /// Result cap for plain nearby search.
    pub nearby_max_results: usize,
    /// Result cap for mood matching.
    pub match_max_results: usize,
    /// Result cap for message history.
    pub message_history_limit: usize,
    /// Bounded outbound queue size per connection.
    pub outbox_capacity: usize,
    /// Edge length of a proximity grid cell, in degrees.
    pub proximity_cell_degrees: f64,
    /// Offline presences older than this are pruned.
    pub presence_retention: Duration,
    /// Mood-pair affinities. Built-in table unless `MOOD_TABLE_PATH` is set.
    pub mood_table: MoodTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            nearby_radius_meters: 5000.0,
            nearby_max_results: 20,
            match_max_results: 10,
            message_history_limit: 100,
            outbox_capacity: 256,
            proximity_cell_degrees: 0.05,
            presence_retention: Duration::from_secs(24 * 60 * 60),
            mood_table: MoodTable::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unparsable values fall back to the
    /// default. Panics with a descriptive message if `MOOD_TABLE_PATH` points
    /// at a file that cannot be read or parsed.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mood_table = match std::env::var("MOOD_TABLE_PATH").ok().filter(|s| !s.is_empty()) {
            Some(path) => MoodTable::from_json_file(&path)
                .unwrap_or_else(|e| panic!("failed to load mood table from {path}: {e}")),
            None => defaults.mood_table,
        };

        Self {
            port: env_or("PORT", defaults.port),
            nearby_radius_meters: env_or("NEARBY_RADIUS_METERS", defaults.nearby_radius_meters),
            nearby_max_results: env_or("NEARBY_MAX_RESULTS", defaults.nearby_max_results),
            match_max_results: env_or("MATCH_MAX_RESULTS", defaults.match_max_results),
            message_history_limit: env_or("MESSAGE_HISTORY_LIMIT", defaults.message_history_limit),
            outbox_capacity: env_or("OUTBOX_CAPACITY", defaults.outbox_capacity).max(1),
            proximity_cell_degrees: Some(env_or(
                "PROXIMITY_CELL_DEGREES",
                defaults.proximity_cell_degrees,
            ))
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(defaults.proximity_cell_degrees),
            presence_retention: std::env::var("PRESENCE_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.presence_retention),
            mood_table,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
