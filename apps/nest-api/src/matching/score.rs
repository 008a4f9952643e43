//! Weighted compatibility score between two mood profiles.

use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

use super::mood::{MoodProfile, MoodTable};

pub const MOOD_WEIGHT: f64 = 0.40;
pub const INTENSITY_WEIGHT: f64 = 0.20;
pub const TAG_WEIGHT: f64 = 0.25;
pub const RECENCY_WEIGHT: f64 = 0.15;

/// Mood reports further apart than this contribute no recency score.
pub const RECENCY_WINDOW_MS: f64 = 86_400_000.0;

/// A component above this earns an explanation in the match reasons.
const REASON_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    High,
    Medium,
    Low,
}

impl Compatibility {
    /// Strict cutoffs: exactly 0.7 is medium, exactly 0.5 is low.
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Score components, each in `[0, 1]` before weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub mood: f64,
    pub intensity: f64,
    pub tags: f64,
    pub recency: f64,
    /// Tags both profiles carry, in the querying user's order.
    pub shared_tags: Vec<String>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        MOOD_WEIGHT * self.mood
            + INTENSITY_WEIGHT * self.intensity
            + TAG_WEIGHT * self.tags
            + RECENCY_WEIGHT * self.recency
    }

    pub fn compatibility(&self) -> Compatibility {
        Compatibility::from_score(self.total())
    }

    /// Human-readable explanations for the strong components.
    pub fn reasons(&self, user: &MoodProfile, candidate: &MoodProfile) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.mood > REASON_THRESHOLD {
            reasons.push(format!(
                "Great mood compatibility ({} + {})",
                user.mood, candidate.mood
            ));
        }
        if self.intensity > REASON_THRESHOLD {
            reasons.push("Similar emotional intensity".to_string());
        }
        if !self.shared_tags.is_empty() {
            reasons.push(format!("Shared interests: {}", self.shared_tags.join(", ")));
        }
        reasons
    }
}

/// Score `candidate` from `user`'s point of view. Mood affinity is read in
/// the `user → candidate` direction.
pub fn score(table: &MoodTable, user: &MoodProfile, candidate: &MoodProfile) -> ScoreBreakdown {
    let mood = table.affinity(&user.mood, &candidate.mood);

    let intensity = (1.0 - (user.intensity - candidate.intensity).abs() / 10.0).max(0.0);

    let (tags, shared_tags) = tag_overlap(&user.tags, &candidate.tags);

    let delta_ms = (user.updated_at - candidate.updated_at)
        .num_milliseconds()
        .unsigned_abs() as f64;
    let recency = (1.0 - delta_ms / RECENCY_WINDOW_MS).max(0.0);

    ScoreBreakdown {
        mood,
        intensity,
        tags,
        recency,
        shared_tags,
    }
}

/// User tags found among the candidate's, over the longer tag list; 0 when
/// both are empty. Counts run over the raw lists, so a repeated user tag
/// counts once per occurrence. The returned names are distinct.
fn tag_overlap(user: &[String], candidate: &[String]) -> (f64, Vec<String>) {
    let longer = user.len().max(candidate.len());
    if longer == 0 {
        return (0.0, Vec::new());
    }

    let theirs: HashSet<&str> = candidate.iter().map(String::as_str).collect();
    let hits = user
        .iter()
        .filter(|tag| theirs.contains(tag.as_str()))
        .count();

    let mut seen = HashSet::new();
    let shared: Vec<String> = user
        .iter()
        .filter(|tag| theirs.contains(tag.as_str()) && seen.insert(tag.as_str()))
        .cloned()
        .collect();
    (hits as f64 / longer as f64, shared)
}
