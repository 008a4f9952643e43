//! Grid-bucketed geospatial index over discoverable users.
//!
//! Users are bucketed by `(floor((lat + 90) / cell), floor((lng + 180) / cell))`.
//! A radius query visits only the buckets that can hold points within the
//! radius, wrapping across the antimeridian. Queries whose box reaches a
//! pole, or would visit more buckets than there are users, scan every
//! position instead.
//!
//! Lock order: a position entry is held while its bucket is updated; the
//! query path clones a bucket before reading positions, so the two never
//! wait on each other.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::f64::consts::PI;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use talknest_common::geo::EARTH_RADIUS_METERS;
use talknest_common::GeoPoint;

/// Meridian arc length of one degree on the haversine sphere.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * PI / 180.0;

/// Slack added to bucket spans so floating-point error at an exact radius
/// never drops a bucket.
const SPAN_EPSILON_DEGREES: f64 = 1e-9;

type Cell = (i32, i32);

/// A user found by a radius query.
#[derive(Debug, Clone, PartialEq)]
pub struct Nearby {
    pub user_id: String,
    pub location: GeoPoint,
    pub distance_meters: f64,
}

pub struct ProximityIndex {
    cell_degrees: f64,
    lng_cells: i32,
    cells: DashMap<Cell, HashSet<String>>,
    positions: DashMap<String, (GeoPoint, Cell)>,
}

impl ProximityIndex {
    /// `cell_degrees` is rounded so a whole number of buckets spans 360°.
    pub fn new(cell_degrees: f64) -> Self {
        let requested = if cell_degrees.is_finite() && cell_degrees > 0.0 {
            cell_degrees.min(90.0)
        } else {
            0.05
        };
        let lng_cells = (360.0 / requested).round().max(4.0) as i32;
        Self {
            cell_degrees: 360.0 / f64::from(lng_cells),
            lng_cells,
            cells: DashMap::new(),
            positions: DashMap::new(),
        }
    }

    pub fn cell_degrees(&self) -> f64 {
        self.cell_degrees
    }

    /// Insert or move a user. Returns `false` (and leaves the index
    /// untouched) for an invalid point.
    pub fn upsert(&self, user_id: &str, point: GeoPoint) -> bool {
        if !point.is_valid() {
            return false;
        }
        let cell = self.cell_of(&point);
        match self.positions.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (_, old_cell) = *occupied.get();
                occupied.insert((point, cell));
                if old_cell != cell {
                    self.detach(old_cell, user_id);
                    self.attach(cell, user_id);
                }
            }
            Entry::Vacant(vacant) => {
                self.attach(cell, user_id);
                vacant.insert((point, cell));
            }
        }
        true
    }

    /// Returns `false` if the user was not indexed.
    pub fn remove(&self, user_id: &str) -> bool {
        match self.positions.entry(user_id.to_string()) {
            Entry::Occupied(occupied) => {
                let (_, cell) = *occupied.get();
                self.detach(cell, user_id);
                occupied.remove();
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.positions.contains_key(user_id)
    }

    pub fn position_of(&self, user_id: &str) -> Option<GeoPoint> {
        self.positions.get(user_id).map(|entry| entry.value().0)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Every indexed user within `radius_meters` of `center` (inclusive),
    /// except `exclude`, ordered by ascending distance then user id.
    ///
    /// An invalid center or a non-positive radius yields an empty result.
    pub fn query(&self, center: GeoPoint, radius_meters: f64, exclude: Option<&str>) -> Vec<Nearby> {
        if !center.is_valid() || !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Vec::new();
        }

        let candidates = match self.covering_cells(&center, radius_meters) {
            Some(cells) => self.collect_cells(cells),
            None => self.collect_all(),
        };

        let mut found: Vec<Nearby> = candidates
            .into_iter()
            .filter(|(user_id, _)| exclude != Some(user_id.as_str()))
            .filter_map(|(user_id, location)| {
                let distance_meters = center.distance_to(&location);
                (distance_meters <= radius_meters).then_some(Nearby {
                    user_id,
                    location,
                    distance_meters,
                })
            })
            .collect();

        found.sort_by(|a, b| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        found
    }

    fn cell_of(&self, point: &GeoPoint) -> Cell {
        let lat = ((point.lat + 90.0) / self.cell_degrees).floor() as i32;
        let lng = self.wrap_lng(((point.lng + 180.0) / self.cell_degrees).floor() as i32);
        (lat, lng)
    }

    fn wrap_lng(&self, column: i32) -> i32 {
        column.rem_euclid(self.lng_cells)
    }

    /// Buckets that may contain points within the radius, or `None` when a
    /// full scan is required.
    fn covering_cells(&self, center: &GeoPoint, radius_meters: f64) -> Option<Vec<Cell>> {
        let angular = radius_meters / EARTH_RADIUS_METERS;
        let lat_span = angular.to_degrees() + SPAN_EPSILON_DEGREES;
        if center.lat - lat_span <= -90.0 || center.lat + lat_span >= 90.0 {
            return None;
        }

        // Widest longitude offset reachable within the radius at this latitude.
        let ratio = angular.sin() / center.lat.to_radians().cos();
        if !(0.0..1.0).contains(&ratio) {
            return None;
        }
        let lng_span = ratio.asin().to_degrees() + SPAN_EPSILON_DEGREES;
        if lng_span >= 180.0 {
            return None;
        }

        let lat_lo = ((center.lat - lat_span + 90.0) / self.cell_degrees).floor() as i32;
        let lat_hi = ((center.lat + lat_span + 90.0) / self.cell_degrees).floor() as i32;
        let lng_lo = ((center.lng - lng_span + 180.0) / self.cell_degrees).floor() as i32;
        let lng_hi = ((center.lng + lng_span + 180.0) / self.cell_degrees).floor() as i32;

        let columns = (lng_hi - lng_lo + 1).min(self.lng_cells);
        let rows = lat_hi - lat_lo + 1;
        let visits = i64::from(rows) * i64::from(columns);
        if visits > self.positions.len() as i64 {
            return None;
        }

        let mut cells = Vec::with_capacity(visits as usize);
        for lat in lat_lo..=lat_hi {
            for offset in 0..columns {
                cells.push((lat, self.wrap_lng(lng_lo + offset)));
            }
        }
        Some(cells)
    }

    fn collect_cells(&self, cells: Vec<Cell>) -> Vec<(String, GeoPoint)> {
        let mut out = Vec::new();
        for cell in cells {
            let members = match self.cells.get(&cell) {
                Some(members) => members.value().clone(),
                None => continue,
            };
            for user_id in members {
                if let Some(position) = self.position_of(&user_id) {
                    out.push((user_id, position));
                }
            }
        }
        out
    }

    fn collect_all(&self) -> Vec<(String, GeoPoint)> {
        self.positions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().0))
            .collect()
    }

    fn attach(&self, cell: Cell, user_id: &str) {
        self.cells.entry(cell).or_default().insert(user_id.to_string());
    }

    fn detach(&self, cell: Cell, user_id: &str) {
        if let Some(mut members) = self.cells.get_mut(&cell) {
            members.remove(user_id);
        }
        self.cells.remove_if(&cell, |_, members| members.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use talknest_common::haversine_meters;

    const SF: GeoPoint = GeoPoint {
        lat: 37.7749,
        lng: -122.4194,
    };

    fn ids(found: &[Nearby]) -> Vec<&str> {
        found.iter().map(|n| n.user_id.as_str()).collect()
    }

    /// Point `meters` due north of `from`.
    fn north_of(from: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint::new(from.lat + meters / METERS_PER_DEGREE, from.lng)
    }

    #[test]
    fn finds_users_within_radius_sorted_by_distance() {
        let index = ProximityIndex::new(0.05);
        index.upsert("far", north_of(SF, 900.0));
        index.upsert("near", north_of(SF, 100.0));
        index.upsert("outside", north_of(SF, 6_000.0));
        index.upsert("me", SF);

        let found = index.query(SF, 1_000.0, Some("me"));
        assert_eq!(ids(&found), vec!["near", "far"]);
        assert!((found[0].distance_meters - 100.0).abs() < 0.5);
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let index = ProximityIndex::new(0.05);
        let spot = GeoPoint::new(37.7849, -122.4094);
        index.upsert("edge", spot);
        let exact = haversine_meters(&SF, &spot);

        assert_eq!(ids(&index.query(SF, exact, None)), vec!["edge"]);
        assert!(index.query(SF, exact - 0.01, None).is_empty());
    }

    #[test]
    fn invalid_queries_are_empty() {
        let index = ProximityIndex::new(0.05);
        index.upsert("u1", SF);

        assert!(index.query(SF, 0.0, None).is_empty());
        assert!(index.query(SF, -5.0, None).is_empty());
        assert!(index.query(SF, f64::NAN, None).is_empty());
        assert!(index.query(GeoPoint::new(95.0, 0.0), 1_000.0, None).is_empty());
    }

    #[test]
    fn invalid_points_are_not_indexed() {
        let index = ProximityIndex::new(0.05);
        assert!(!index.upsert("u1", GeoPoint::new(0.0, 200.0)));
        assert!(index.is_empty());
    }

    #[test]
    fn moving_a_user_changes_its_bucket() {
        let index = ProximityIndex::new(0.05);
        index.upsert("u1", SF);
        let elsewhere = GeoPoint::new(40.7128, -74.0060);
        index.upsert("u1", elsewhere);

        assert_eq!(index.len(), 1);
        assert!(index.query(SF, 5_000.0, None).is_empty());
        assert_eq!(ids(&index.query(elsewhere, 10.0, None)), vec!["u1"]);
        assert_eq!(index.cells.len(), 1);
    }

    #[test]
    fn remove_drops_user_and_empty_bucket() {
        let index = ProximityIndex::new(0.05);
        index.upsert("u1", SF);
        assert!(index.remove("u1"));
        assert!(!index.remove("u1"));
        assert!(index.query(SF, 5_000.0, None).is_empty());
        assert!(index.cells.is_empty());
    }

    #[test]
    fn query_wraps_across_antimeridian() {
        let index = ProximityIndex::new(0.05);
        // Pad the index so the bucket walk is cheaper than a full scan.
        for i in 0..200 {
            index.upsert(&format!("pad{i}"), GeoPoint::new(-40.0, f64::from(i) * 0.5 - 50.0));
        }
        index.upsert("east", GeoPoint::new(0.0, -179.99));
        let center = GeoPoint::new(0.0, 179.99);

        assert!(index.covering_cells(&center, 5_000.0).is_some());
        assert_eq!(ids(&index.query(center, 5_000.0, None)), vec!["east"]);
    }

    #[test]
    fn polar_queries_fall_back_to_full_scan() {
        let index = ProximityIndex::new(0.05);
        index.upsert("a", GeoPoint::new(89.99, 0.0));
        index.upsert("b", GeoPoint::new(89.99, 180.0));
        let pole = GeoPoint::new(90.0, 0.0);

        assert!(index.covering_cells(&pole, 5_000.0).is_none());
        assert_eq!(ids(&index.query(pole, 5_000.0, None)), vec!["a", "b"]);
    }

    #[test]
    fn cell_size_divides_the_globe() {
        let index = ProximityIndex::new(0.07);
        let columns = 360.0 / index.cell_degrees();
        assert!((columns - columns.round()).abs() < 1e-9);
    }

    #[test]
    fn grid_agrees_with_brute_force() {
        let mut rng = rand::thread_rng();
        let index = ProximityIndex::new(0.02);
        let mut points = Vec::new();
        for i in 0..2_000 {
            let p = GeoPoint::new(
                SF.lat + rng.gen_range(-0.3..0.3),
                SF.lng + rng.gen_range(-0.3..0.3),
            );
            let id = format!("u{i}");
            index.upsert(&id, p);
            points.push((id, p));
        }

        for _ in 0..25 {
            let center = GeoPoint::new(
                SF.lat + rng.gen_range(-0.2..0.2),
                SF.lng + rng.gen_range(-0.2..0.2),
            );
            let radius = rng.gen_range(100.0..8_000.0);

            let mut expected: Vec<&str> = points
                .iter()
                .filter(|(_, p)| haversine_meters(&center, p) <= radius)
                .map(|(id, _)| id.as_str())
                .collect();
            expected.sort();

            let found = index.query(center, radius, None);
            let mut got = ids(&found);
            got.sort();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn concurrent_upserts_keep_one_bucket_per_user() {
        let index = std::sync::Arc::new(ProximityIndex::new(0.01));
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for step in 0..200 {
                        let p = GeoPoint::new(10.0 + f64::from(step % 7) * 0.013, f64::from(t));
                        index.upsert("walker", p);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let buckets_holding: usize = index
            .cells
            .iter()
            .filter(|entry| entry.value().contains("walker"))
            .count();
        assert_eq!(buckets_holding, 1);
        assert_eq!(index.len(), 1);
    }
}
