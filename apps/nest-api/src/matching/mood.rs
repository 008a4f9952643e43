//! Mood profiles, the mood-pair affinity table, and per-mood insights.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Filter value that matches every mood in nearby search.
pub const ALL_MOODS: &str = "All Moods";

/// Affinity used for mood pairs the table does not list.
pub const NEUTRAL_AFFINITY: f64 = 0.5;

pub const MIN_INTENSITY: f64 = 1.0;
pub const MAX_INTENSITY: f64 = 10.0;

/// A user's self-reported emotional state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MoodProfile {
    pub mood: String,
    /// 1 (mild) to 10 (intense).
    pub intensity: f64,
    pub tags: Vec<String>,
    /// When the mood was reported; drives the recency score.
    pub updated_at: DateTime<Utc>,
}

impl MoodProfile {
    /// Build a profile, clamping intensity into `[1, 10]`. A non-finite
    /// intensity becomes the midpoint.
    pub fn new(mood: &str, intensity: f64, tags: Vec<String>, updated_at: DateTime<Utc>) -> Self {
        let intensity = if intensity.is_finite() {
            intensity.clamp(MIN_INTENSITY, MAX_INTENSITY)
        } else {
            (MIN_INTENSITY + MAX_INTENSITY) / 2.0
        };
        Self {
            mood: mood.trim().to_string(),
            intensity,
            tags,
            updated_at,
        }
    }
}

/// Directional mood-pair affinities in `[0, 1]`.
///
/// `affinity(a, b)` reads row `a`, column `b`. The table is not symmetric:
/// `Anxious → Calm` is listed while `Calm → Anxious` falls back to
/// [`NEUTRAL_AFFINITY`]. Lookups keep that direction as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoodTable {
    rows: HashMap<String, HashMap<String, f64>>,
}

impl MoodTable {
    pub fn from_rows(rows: HashMap<String, HashMap<String, f64>>) -> Self {
        Self { rows }
    }

    /// Load a table from a JSON object of objects:
    /// `{"Anxious": {"Calm": 0.9, ...}, ...}`. Values are clamped to `[0, 1]`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let mut table: Self = serde_json::from_str(text)?;
        for row in table.rows.values_mut() {
            for value in row.values_mut() {
                *value = if value.is_finite() {
                    value.clamp(0.0, 1.0)
                } else {
                    NEUTRAL_AFFINITY
                };
            }
        }
        Ok(table)
    }

    pub fn affinity(&self, from: &str, to: &str) -> f64 {
        self.rows
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(NEUTRAL_AFFINITY)
    }
}

impl Default for MoodTable {
    fn default() -> Self {
        let rows: &[(&str, &[(&str, f64)])] = &[
            (
                "Anxious",
                &[
                    ("Calm", 0.9),
                    ("Supportive", 0.8),
                    ("Understanding", 0.9),
                    ("Anxious", 0.6),
                    ("Happy", 0.4),
                    ("Excited", 0.3),
                ],
            ),
            (
                "Depressed",
                &[
                    ("Supportive", 0.9),
                    ("Understanding", 0.8),
                    ("Calm", 0.7),
                    ("Happy", 0.5),
                    ("Depressed", 0.4),
                ],
            ),
            (
                "Lonely",
                &[
                    ("Friendly", 0.9),
                    ("Social", 0.8),
                    ("Understanding", 0.7),
                    ("Lonely", 0.6),
                ],
            ),
            (
                "Happy",
                &[
                    ("Happy", 0.8),
                    ("Excited", 0.7),
                    ("Social", 0.6),
                    ("Anxious", 0.4),
                    ("Depressed", 0.3),
                ],
            ),
            (
                "Stressed",
                &[
                    ("Calm", 0.9),
                    ("Supportive", 0.8),
                    ("Understanding", 0.7),
                    ("Stressed", 0.5),
                ],
            ),
        ];

        Self::from_rows(
            rows.iter()
                .map(|(from, cols)| {
                    let row = cols.iter().map(|(to, v)| (to.to_string(), *v)).collect();
                    (from.to_string(), row)
                })
                .collect(),
        )
    }
}

/// Short suggestions shown alongside matches for a given mood.
pub fn insights(mood: &str) -> Vec<&'static str> {
    match mood {
        "Anxious" => vec![
            "Consider connecting with someone calm and understanding",
            "Breathing exercises and grounding techniques might help",
        ],
        "Depressed" => vec![
            "Reaching out for support is a brave first step",
            "Small social connections can make a big difference",
        ],
        "Lonely" => vec![
            "You're not alone - many people feel this way",
            "Even brief conversations can help combat loneliness",
        ],
        "Stressed" => vec![
            "Talking through stress can provide new perspectives",
            "Consider meeting someone in a calm environment",
        ],
        _ => Vec::new(),
    }
}

/// `None`, empty, and [`ALL_MOODS`] match everything; otherwise exact match.
pub fn mood_filter_matches(filter: Option<&str>, mood: Option<&str>) -> bool {
    match filter.map(str::trim) {
        None | Some("") | Some(ALL_MOODS) => true,
        Some(wanted) => mood == Some(wanted),
    }
}
