//! Turns proximity candidates into ranked result lists.
//!
//! Each query is stateless: it reads the proximity index and presence as
//! they are at call time. Every candidate is re-checked against presence so
//! a user who went offline between index update and query is skipped.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use talknest_common::GeoPoint;
use utoipa::ToSchema;

use crate::gateway::hub::Hub;
use crate::gateway::presence::UserPresence;
use crate::proximity::Nearby;

use super::mood::{mood_filter_matches, MoodProfile};
use super::score::{score, Compatibility};

/// A nearby, discoverable user.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NearbyUser {
    pub user_id: String,
    pub location: GeoPoint,
    pub distance_meters: f64,
    pub mood: Option<String>,
    pub available: bool,
}

/// A scored mood match.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MatchCandidate {
    pub user_id: String,
    pub location: GeoPoint,
    pub distance_meters: f64,
    pub mood: String,
    /// Weighted mood-affinity component of the score, in `[0, 1]`.
    pub mood_compatibility: f64,
    pub score: f64,
    pub compatibility: Compatibility,
    pub reasons: Vec<String>,
}

pub struct Matchmaker {
    hub: Arc<Hub>,
}

impl Matchmaker {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Discoverable users within `radius_meters` of `center`, closest first,
    /// filtered by exact mood (or the "All Moods" wildcard), capped at
    /// `max_results`.
    pub fn nearby(
        &self,
        user_id: Option<&str>,
        center: GeoPoint,
        radius_meters: f64,
        mood_filter: Option<&str>,
        max_results: usize,
    ) -> Vec<NearbyUser> {
        self.hub
            .proximity()
            .query(center, radius_meters, user_id)
            .into_iter()
            .filter_map(|hit| {
                let presence = self.live_presence(&hit)?;
                let mood = presence.mood.map(|m| m.mood);
                mood_filter_matches(mood_filter, mood.as_deref()).then(|| NearbyUser {
                    user_id: hit.user_id,
                    location: hit.location,
                    distance_meters: hit.distance_meters,
                    mood,
                    available: presence.available,
                })
            })
            .take(max_results)
            .collect()
    }

    /// Discoverable users within the radius ranked by compatibility with
    /// `profile`: score descending, then distance ascending, then user id.
    /// Candidates without a mood are skipped.
    pub fn mood_matches(
        &self,
        user_id: &str,
        profile: &MoodProfile,
        center: GeoPoint,
        radius_meters: f64,
        max_results: usize,
    ) -> Vec<MatchCandidate> {
        let table = &self.hub.config().mood_table;
        let candidates = self
            .hub
            .proximity()
            .query(center, radius_meters, Some(user_id))
            .into_iter()
            .filter_map(|hit| {
                let theirs = self.live_presence(&hit)?.mood?;
                let breakdown = score(table, profile, &theirs);
                Some(MatchCandidate {
                    reasons: breakdown.reasons(profile, &theirs),
                    score: breakdown.total(),
                    compatibility: breakdown.compatibility(),
                    mood_compatibility: breakdown.mood,
                    mood: theirs.mood,
                    user_id: hit.user_id,
                    location: hit.location,
                    distance_meters: hit.distance_meters,
                })
            })
            .collect();
        rank(candidates, max_results)
    }

    fn live_presence(&self, hit: &Nearby) -> Option<UserPresence> {
        self.hub
            .presence()
            .get(&hit.user_id)
            .filter(UserPresence::is_discoverable)
    }
}

/// Sort by score descending, distance ascending, user id; keep the first
/// `max_results`.
pub fn rank(mut candidates: Vec<MatchCandidate>, max_results: usize) -> Vec<MatchCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.distance_meters
                    .partial_cmp(&b.distance_meters)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    candidates.truncate(max_results);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::events::InboundEvent;
    use crate::proximity::METERS_PER_DEGREE;
    use chrono::Utc;

    const HOME: GeoPoint = GeoPoint {
        lat: 37.7749,
        lng: -122.4194,
    };

    fn north(meters: f64) -> GeoPoint {
        GeoPoint::new(HOME.lat + meters / METERS_PER_DEGREE, HOME.lng)
    }

    fn setup() -> (Arc<Hub>, Matchmaker) {
        let hub = Arc::new(Hub::new(Arc::new(Config::default())));
        (hub.clone(), Matchmaker::new(hub))
    }

    fn online_at(hub: &Hub, user: &str, at: GeoPoint, mood: Option<(&str, f64, &[&str])>) {
        hub.join(user);
        hub.dispatch(InboundEvent::LocationUpdate {
            user_id: user.to_string(),
            lat: at.lat,
            lng: at.lng,
        });
        if let Some((mood, intensity, tags)) = mood {
            hub.dispatch(InboundEvent::MoodUpdate {
                user_id: user.to_string(),
                mood: mood.to_string(),
                intensity,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            });
        }
    }

    fn candidate(user: &str, score: f64, distance: f64) -> MatchCandidate {
        MatchCandidate {
            user_id: user.to_string(),
            location: HOME,
            distance_meters: distance,
            mood: "Calm".to_string(),
            mood_compatibility: 0.5,
            score,
            compatibility: Compatibility::from_score(score),
            reasons: Vec::new(),
        }
    }

    #[test]
    fn rank_breaks_score_ties_by_distance() {
        let ranked = rank(
            vec![
                candidate("far", 0.8, 500.0),
                candidate("near", 0.8, 50.0),
                candidate("best", 0.9, 900.0),
            ],
            10,
        );
        let order: Vec<&str> = ranked.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(order, vec!["best", "near", "far"]);
    }

    #[test]
    fn rank_truncates() {
        let ranked = rank(
            (0..15).map(|i| candidate(&format!("u{i:02}"), 0.6, 10.0)).collect(),
            10,
        );
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].user_id, "u00");
    }

    #[test]
    fn anxious_user_finds_calm_neighbour_with_high_compatibility() {
        let (hub, matcher) = setup();
        online_at(&hub, "usr_a", HOME, Some(("Anxious", 5.0, &["support"])));
        online_at(&hub, "usr_b", north(100.0), Some(("Calm", 5.0, &["support"])));

        let profile = hub.presence_of("usr_a").unwrap().mood.unwrap();
        let matches = matcher.mood_matches("usr_a", &profile, HOME, 5_000.0, 10);

        assert_eq!(matches.len(), 1);
        let b = &matches[0];
        assert_eq!(b.user_id, "usr_b");
        assert_eq!(b.compatibility, Compatibility::High);
        assert_eq!(b.mood_compatibility, 0.9);
        assert!(b.score > 0.9);
        assert!((b.distance_meters - 100.0).abs() < 0.5);
        assert!(b.reasons[0].starts_with("Great mood compatibility"));
    }

    #[test]
    fn equal_scores_rank_closer_first() {
        let (hub, matcher) = setup();
        let now = Utc::now();
        online_at(&hub, "usr_far", north(500.0), None);
        online_at(&hub, "usr_near", north(50.0), None);
        // Same profile and timestamp for both candidates.
        let theirs = MoodProfile::new("Calm", 4.0, vec![], now);
        hub.presence().update_mood("usr_far", theirs.clone());
        hub.presence().update_mood("usr_near", theirs);

        let mine = MoodProfile::new("Stressed", 4.0, vec![], now);
        let matches = matcher.mood_matches("usr_me", &mine, HOME, 1_000.0, 10);
        let order: Vec<&str> = matches.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(order, vec!["usr_near", "usr_far"]);
        assert_eq!(matches[0].score, matches[1].score);
    }

    #[test]
    fn candidates_without_mood_are_not_matched() {
        let (hub, matcher) = setup();
        online_at(&hub, "usr_b", north(100.0), None);
        let mine = MoodProfile::new("Lonely", 5.0, vec![], Utc::now());
        assert!(matcher.mood_matches("usr_a", &mine, HOME, 5_000.0, 10).is_empty());
    }

    #[test]
    fn nearby_orders_by_distance_and_filters_mood() {
        let (hub, matcher) = setup();
        online_at(&hub, "usr_me", HOME, Some(("Happy", 5.0, &[])));
        online_at(&hub, "usr_calm_far", north(900.0), Some(("Calm", 5.0, &[])));
        online_at(&hub, "usr_calm_near", north(200.0), Some(("Calm", 5.0, &[])));
        online_at(&hub, "usr_sad", north(300.0), Some(("Depressed", 5.0, &[])));
        online_at(&hub, "usr_quiet", north(400.0), None);
        online_at(&hub, "usr_away", north(8_000.0), Some(("Calm", 5.0, &[])));

        let all = matcher.nearby(Some("usr_me"), HOME, 5_000.0, Some("All Moods"), 20);
        let order: Vec<&str> = all.iter().map(|n| n.user_id.as_str()).collect();
        assert_eq!(
            order,
            vec!["usr_calm_near", "usr_sad", "usr_quiet", "usr_calm_far"]
        );

        let calm = matcher.nearby(Some("usr_me"), HOME, 5_000.0, Some("Calm"), 20);
        let order: Vec<&str> = calm.iter().map(|n| n.user_id.as_str()).collect();
        assert_eq!(order, vec!["usr_calm_near", "usr_calm_far"]);

        let capped = matcher.nearby(Some("usr_me"), HOME, 5_000.0, None, 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn unavailable_and_offline_users_are_not_found() {
        let (hub, matcher) = setup();
        online_at(&hub, "usr_busy", north(100.0), None);
        online_at(&hub, "usr_gone", north(200.0), None);
        online_at(&hub, "usr_here", north(300.0), None);

        hub.dispatch(InboundEvent::AvailabilityUpdate {
            user_id: "usr_busy".to_string(),
            available: false,
        });
        hub.dispatch(InboundEvent::Disconnect {
            user_id: "usr_gone".to_string(),
        });

        let found = matcher.nearby(None, HOME, 5_000.0, None, 20);
        let ids: Vec<&str> = found.iter().map(|n| n.user_id.as_str()).collect();
        assert_eq!(ids, vec!["usr_here"]);
    }

    #[test]
    fn stale_index_entry_is_filtered_by_presence() {
        let (hub, matcher) = setup();
        online_at(&hub, "usr_b", north(100.0), None);
        // Presence changes without the index being refreshed.
        hub.presence().set_available("usr_b", false);
        assert!(hub.proximity().contains("usr_b"));

        assert!(matcher.nearby(None, HOME, 5_000.0, None, 20).is_empty());
    }

    #[test]
    fn invalid_query_is_empty() {
        let (hub, matcher) = setup();
        online_at(&hub, "usr_b", north(100.0), None);
        assert!(matcher.nearby(None, HOME, 0.0, None, 20).is_empty());
        assert!(matcher
            .nearby(None, GeoPoint::new(f64::NAN, 0.0), 5_000.0, None, 20)
            .is_empty());
    }
}
