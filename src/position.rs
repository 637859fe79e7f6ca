//! # Live Position Tracker
//!
//! A location can follow a moving source (a boat, a vehicle) instead of a
//! fixed point. The tracker keeps the reference point the tide data was
//! fetched for, the latest observed point, and decides when the reference
//! must be re-anchored: either the source drifted beyond a distance
//! threshold, or the reference is simply too old. The age ceiling makes a
//! slowly-drifting point still re-center eventually and refresh its
//! nearby-station data.
//!
//! Re-anchoring itself only moves the reference; the caller propagates the
//! new coordinates into the server parameters, which changes the fingerprint
//! and forces the scheduler's refetch path.

use chrono::{DateTime, Duration, Utc};

use crate::config::DisplayUnit;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default re-anchor ceiling.
pub const DEFAULT_MAX_REF_AGE_HOURS: i64 = 6;

/// Great-circle distance between two (latitude, longitude) points in
/// decimal degrees, in kilometers.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Reference point plus latest observation for one moving location.
#[derive(Debug, Clone)]
pub struct LivePosition {
    ref_lat: f64,
    ref_long: f64,
    ref_time: DateTime<Utc>,
    current_lat: Option<f64>,
    current_long: Option<f64>,
    last_distance_km: f64,
    reanchor_distance_km: f64,
    reanchor_max_age: Duration,
}

impl LivePosition {
    /// Create a tracker anchored at (`ref_lat`, `ref_long`).
    ///
    /// `reanchor_distance` is expressed in the display unit and converted
    /// to kilometers here, consistent with how distances are reported back.
    pub fn new(
        ref_lat: f64,
        ref_long: f64,
        now: DateTime<Utc>,
        reanchor_distance: f64,
        unit: DisplayUnit,
        max_ref_age_hours: i64,
    ) -> Self {
        LivePosition {
            ref_lat,
            ref_long,
            ref_time: now,
            current_lat: None,
            current_long: None,
            last_distance_km: 0.0,
            reanchor_distance_km: unit.distance_to_km(reanchor_distance),
            reanchor_max_age: Duration::hours(max_ref_age_hours),
        }
    }

    pub fn ref_lat(&self) -> f64 {
        self.ref_lat
    }

    pub fn ref_long(&self) -> f64 {
        self.ref_long
    }

    pub fn current_lat(&self) -> Option<f64> {
        self.current_lat
    }

    pub fn current_long(&self) -> Option<f64> {
        self.current_long
    }

    /// Distance between the last observation and the reference point, km.
    pub fn distance_from_ref_km(&self) -> f64 {
        self.last_distance_km
    }

    /// Record an observed position and recompute the reference distance.
    pub fn update(&mut self, lat: f64, long: f64, _now: DateTime<Utc>) {
        self.current_lat = Some(lat);
        self.current_long = Some(long);
        self.last_distance_km = haversine_km((self.ref_lat, self.ref_long), (lat, long));
    }

    /// Whether the reference point must move: the observation drifted past
    /// the distance threshold, or the reference exceeded its age ceiling
    /// (even at zero distance).
    pub fn need_to_change_ref(&self, lat: f64, long: f64, now: DateTime<Utc>) -> bool {
        if haversine_km((self.ref_lat, self.ref_long), (lat, long)) > self.reanchor_distance_km {
            return true;
        }
        now - self.ref_time >= self.reanchor_max_age
    }

    /// Re-anchor the reference point.
    ///
    /// The caller is responsible for pushing the new coordinates into the
    /// server parameters so the scheduler sees the fingerprint change.
    pub fn change_ref(&mut self, lat: f64, long: f64, now: DateTime<Utc>) {
        self.ref_lat = lat;
        self.ref_long = long;
        self.ref_time = now;
        self.last_distance_km = match (self.current_lat, self.current_long) {
            (Some(cur_lat), Some(cur_long)) => haversine_km((lat, long), (cur_lat, cur_long)),
            _ => 0.0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn one_degree_of_longitude_at_the_equator() {
        let d = haversine_km((0.0, 0.0), (0.0, 1.0));
        // ~111.19 km, within 0.5%
        assert!((d - 111.19).abs() / 111.19 < 0.005, "got {d}");
    }

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(haversine_km((48.383, -4.495), (48.383, -4.495)), 0.0);
    }

    #[test]
    fn update_tracks_distance_from_reference() {
        let mut pos = LivePosition::new(0.0, 0.0, t0(), 50.0, DisplayUnit::Metric, 6);
        pos.update(0.0, 1.0, t0());
        assert!((pos.distance_from_ref_km() - 111.19).abs() < 1.0);
        assert_eq!(pos.current_lat(), Some(0.0));
        assert_eq!(pos.current_long(), Some(1.0));
    }

    #[test]
    fn reanchor_on_distance_threshold() {
        let pos = LivePosition::new(0.0, 0.0, t0(), 50.0, DisplayUnit::Metric, 6);
        // ~11 km: inside the 50 km threshold
        assert!(!pos.need_to_change_ref(0.0, 0.1, t0()));
        // ~111 km: beyond it
        assert!(pos.need_to_change_ref(0.0, 1.0, t0()));
    }

    #[test]
    fn threshold_is_converted_from_display_unit() {
        // 50 miles ≈ 80.5 km, so a 90 km drift is within a metric 100 km
        // threshold but beyond an imperial 50 mile one
        let metric = LivePosition::new(0.0, 0.0, t0(), 100.0, DisplayUnit::Metric, 6);
        let imperial = LivePosition::new(0.0, 0.0, t0(), 50.0, DisplayUnit::Imperial, 6);
        // ~0.81 degrees ≈ 90 km at the equator
        assert!(!metric.need_to_change_ref(0.0, 0.81, t0()));
        assert!(imperial.need_to_change_ref(0.0, 0.81, t0()));
    }

    #[test]
    fn reanchor_on_age_even_at_zero_distance() {
        let pos = LivePosition::new(0.0, 0.0, t0(), 50.0, DisplayUnit::Metric, 6);
        assert!(!pos.need_to_change_ref(0.0, 0.0, t0() + Duration::hours(5)));
        assert!(pos.need_to_change_ref(0.0, 0.0, t0() + Duration::hours(6)));
    }

    #[test]
    fn change_ref_resets_anchor_and_age() {
        let mut pos = LivePosition::new(0.0, 0.0, t0(), 50.0, DisplayUnit::Metric, 6);
        pos.update(0.0, 1.0, t0());
        assert!(pos.need_to_change_ref(0.0, 1.0, t0()));

        let later = t0() + Duration::hours(1);
        pos.change_ref(0.0, 1.0, later);
        assert_eq!(pos.ref_long(), 1.0);
        assert_eq!(pos.distance_from_ref_km(), 0.0);
        assert!(!pos.need_to_change_ref(0.0, 1.0, later + Duration::hours(5)));
        assert!(pos.need_to_change_ref(0.0, 1.0, later + Duration::hours(6)));
    }
}
