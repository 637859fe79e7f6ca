//! # Fetch Scheduler
//!
//! Decides *whether* a remote call is due, never *how* it is made. Two
//! independent predicates cover the two call kinds:
//!
//! - station metadata, refreshed every 30 days from local midnight;
//! - heights/extrema, refreshed at the earliest of a 25 h watchdog interval
//!   (deliberately longer than 24 h to tolerate clock drift) and the next
//!   local midnight, so the rolling window always covers the new day.
//!
//! A fetch failure advances nothing; the predicate stays true and the next
//! externally-triggered cycle retries. A parameter-fingerprint change forces
//! both predicates and tells the coordinator to discard the previous dataset
//! instead of rotating it.

use chrono::{DateTime, Days, Duration, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::ServerParameters;
use crate::storage::CacheSnapshot;

/// Snapshot schema version; a bump invalidates all prior caches.
pub const SNAPSHOT_VERSION: u32 = 5;

/// Station metadata refresh period, in days from local midnight.
pub const STATION_REFRESH_DAYS: u64 = 30;

/// Height watchdog interval in seconds (25 h).
pub const HEIGHT_REFRESH_INTERVAL_SECS: i64 = 90_000;

/// Why a station fetch is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationFetchReason {
    NeverFetched,
    LongDeadlinePassed,
    ParametersChanged,
}

impl fmt::Display for StationFetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationFetchReason::NeverFetched => write!(f, "station data never fetched"),
            StationFetchReason::LongDeadlinePassed => write!(f, "long-period deadline reached"),
            StationFetchReason::ParametersChanged => write!(f, "parameters have changed"),
        }
    }
}

/// Why a height fetch is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightFetchReason {
    StationRefetched,
    ParametersChanged,
    NeverFetched,
    IntervalElapsed,
    MidnightPassed,
}

impl fmt::Display for HeightFetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeightFetchReason::StationRefetched => write!(f, "station data was just refetched"),
            HeightFetchReason::ParametersChanged => write!(f, "parameters have changed"),
            HeightFetchReason::NeverFetched => write!(f, "height data never fetched"),
            HeightFetchReason::IntervalElapsed => write!(f, "watchdog interval elapsed"),
            HeightFetchReason::MidnightPassed => write!(f, "daily deadline reached"),
        }
    }
}

/// Persisted scheduler bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Time of the last successful height fetch
    pub last_height_fetch: Option<DateTime<Local>>,
    /// Time of the last successful station fetch
    pub last_station_fetch: Option<DateTime<Local>>,
    /// Next local midnight after the last height fetch
    pub next_day_midnight: Option<DateTime<Local>>,
    /// Midnight 30 days after the last station fetch
    pub next_long_deadline: Option<DateTime<Local>>,
}

/// The per-location fetch state machine.
#[derive(Debug, Clone)]
pub struct Scheduler {
    params: ServerParameters,
    station_refetch_pending: bool,
    height_refetch_pending: bool,
    state: SchedulerState,
}

/// Local midnight `days` days after `now`. Falls back to a plain duration
/// add on the rare ambiguous local time (DST transition at midnight).
fn midnight_after(now: DateTime<Local>, days: u64) -> DateTime<Local> {
    (now.date_naive() + Days::new(days))
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .unwrap_or(now + Duration::days(days as i64))
}

impl Scheduler {
    pub fn new(params: ServerParameters) -> Self {
        Scheduler {
            params,
            station_refetch_pending: false,
            height_refetch_pending: false,
            state: SchedulerState::default(),
        }
    }

    pub fn parameters(&self) -> &ServerParameters {
        &self.params
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Whether the fingerprint changed since the last successful height
    /// fetch. While true, the previous dataset must be discarded on the next
    /// rotation; its coordinate frame is no longer valid.
    pub fn parameters_changed(&self) -> bool {
        self.height_refetch_pending
    }

    /// Install a new parameter fingerprint.
    ///
    /// A forced refetch is armed for each fetch kind separately, so a cycle
    /// where one call fails and the other succeeds still retries the failed
    /// one. The flags are armed only when data was fetched before: at cold
    /// start there is nothing to invalidate, and arming them would force a
    /// useless paid refetch.
    pub fn update_parameters(&mut self, params: ServerParameters) {
        if params != self.params && self.state.last_station_fetch.is_some() {
            self.station_refetch_pending = true;
            self.height_refetch_pending = true;
        }
        self.params = params;
    }

    /// Whether station metadata must be re-fetched, and why.
    pub fn station_fetch_due(&self, now: DateTime<Local>) -> Option<StationFetchReason> {
        if self.state.last_station_fetch.is_none() {
            return Some(StationFetchReason::NeverFetched);
        }
        if matches!(self.state.next_long_deadline, Some(deadline) if now >= deadline) {
            return Some(StationFetchReason::LongDeadlinePassed);
        }
        if self.station_refetch_pending {
            return Some(StationFetchReason::ParametersChanged);
        }
        None
    }

    /// Whether height/extrema data must be re-fetched, and why.
    ///
    /// A station refresh always forces a height refresh so both datasets are
    /// resynced under the same parameters and fresh datum offsets arrive.
    pub fn height_fetch_due(
        &self,
        station_just_fetched: bool,
        now: DateTime<Local>,
    ) -> Option<HeightFetchReason> {
        if station_just_fetched {
            return Some(HeightFetchReason::StationRefetched);
        }
        if self.height_refetch_pending {
            return Some(HeightFetchReason::ParametersChanged);
        }
        let Some(last) = self.state.last_height_fetch else {
            return Some(HeightFetchReason::NeverFetched);
        };
        if now >= last + Duration::seconds(HEIGHT_REFRESH_INTERVAL_SECS) {
            return Some(HeightFetchReason::IntervalElapsed);
        }
        if matches!(self.state.next_day_midnight, Some(deadline) if now >= deadline) {
            return Some(HeightFetchReason::MidnightPassed);
        }
        None
    }

    /// Record a successful station fetch: advance the long-period deadline
    /// and consume the station side of any pending parameter change.
    pub fn record_station_fetch(&mut self, now: DateTime<Local>) {
        self.state.last_station_fetch = Some(now);
        self.state.next_long_deadline = Some(midnight_after(now, STATION_REFRESH_DAYS));
        self.station_refetch_pending = false;
    }

    /// Record a successful height fetch: advance the daily deadline and
    /// consume the height side of any pending parameter change (the
    /// coordinator has discarded the stale previous dataset by now). The
    /// station side stays armed until its own fetch lands.
    pub fn record_height_fetch(&mut self, now: DateTime<Local>) {
        self.state.last_height_fetch = Some(now);
        self.state.next_day_midnight = Some(midnight_after(now, 1));
        self.height_refetch_pending = false;
    }

    /// Whether a persisted snapshot may seed this scheduler: same schema
    /// version and fingerprint-equal parameters, otherwise it is treated as
    /// absent, never partially merged.
    pub fn snapshot_usable(&self, snapshot: &CacheSnapshot) -> bool {
        snapshot.version == SNAPSHOT_VERSION && snapshot.parameters == self.params
    }

    /// Seed bookkeeping from a usable snapshot.
    pub fn restore_state(&mut self, state: SchedulerState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PlotUnit;
    use chrono::TimeZone;

    fn params() -> ServerParameters {
        ServerParameters {
            api_key: "k".to_string(),
            latitude: 48.383,
            longitude: -4.495,
            vertical_ref: "LAT".to_string(),
            station_distance_km: 50.0,
            plot_color: "2,102,255".to_string(),
            plot_background: "255,255,255".to_string(),
            plot_unit: PlotUnit::Meters,
            prediction_days: 3,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn fresh_scheduler_wants_both_fetches() {
        let scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        assert_eq!(
            scheduler.station_fetch_due(now),
            Some(StationFetchReason::NeverFetched)
        );
        assert_eq!(
            scheduler.height_fetch_due(false, now),
            Some(HeightFetchReason::NeverFetched)
        );
    }

    #[test]
    fn recorded_fetches_silence_both_predicates() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);

        let later = at(2026, 1, 10, 18, 0);
        assert_eq!(scheduler.station_fetch_due(later), None);
        assert_eq!(scheduler.height_fetch_due(false, later), None);
    }

    #[test]
    fn station_refetch_forces_height_refetch() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);
        assert_eq!(
            scheduler.height_fetch_due(true, now),
            Some(HeightFetchReason::StationRefetched)
        );
    }

    #[test]
    fn crossing_midnight_flips_height_due() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 22, 0);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);

        // well inside the 25 h watchdog, but past local midnight
        let after_midnight = at(2026, 1, 11, 0, 30);
        assert_eq!(
            scheduler.height_fetch_due(false, after_midnight),
            Some(HeightFetchReason::MidnightPassed)
        );
    }

    #[test]
    fn watchdog_interval_flips_height_due() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 0, 10);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);
        // push the daily deadline out of the way to isolate the watchdog
        scheduler.state.next_day_midnight = Some(at(2026, 3, 1, 0, 0));

        let before = now + Duration::seconds(HEIGHT_REFRESH_INTERVAL_SECS - 1);
        assert_eq!(scheduler.height_fetch_due(false, before), None);

        let after = now + Duration::seconds(HEIGHT_REFRESH_INTERVAL_SECS);
        assert_eq!(
            scheduler.height_fetch_due(false, after),
            Some(HeightFetchReason::IntervalElapsed)
        );
    }

    #[test]
    fn long_deadline_flips_station_due() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        scheduler.record_station_fetch(now);
        assert_eq!(scheduler.station_fetch_due(now), None);

        let next_month = at(2026, 2, 9, 0, 0);
        assert_eq!(
            scheduler.station_fetch_due(next_month),
            Some(StationFetchReason::LongDeadlinePassed)
        );
    }

    #[test]
    fn parameter_change_forces_both_predicates() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);

        scheduler.update_parameters(params().with_coordinates(48.5, -4.5));
        assert!(scheduler.parameters_changed());
        assert_eq!(
            scheduler.station_fetch_due(now),
            Some(StationFetchReason::ParametersChanged)
        );
        assert_eq!(
            scheduler.height_fetch_due(false, now),
            Some(HeightFetchReason::ParametersChanged)
        );

        // a successful height fetch consumes only the height side
        scheduler.record_height_fetch(now);
        assert!(!scheduler.parameters_changed());
        assert_eq!(scheduler.height_fetch_due(false, now), None);
        assert_eq!(
            scheduler.station_fetch_due(now),
            Some(StationFetchReason::ParametersChanged)
        );

        scheduler.record_station_fetch(now);
        assert_eq!(scheduler.station_fetch_due(now), None);
    }

    #[test]
    fn forced_station_refetch_survives_a_height_only_cycle() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);
        scheduler.update_parameters(params().with_coordinates(48.5, -4.5));

        // the station fetch failed this cycle, only the height fetch landed
        scheduler.record_height_fetch(now);

        // the station refetch must stay due rather than waiting 30 days
        assert_eq!(
            scheduler.station_fetch_due(now),
            Some(StationFetchReason::ParametersChanged)
        );
    }

    #[test]
    fn parameter_change_before_any_fetch_is_not_armed() {
        let mut scheduler = Scheduler::new(params());
        scheduler.update_parameters(params().with_coordinates(48.5, -4.5));
        // still due, but for the never-fetched reason, not a forced refetch
        assert!(!scheduler.parameters_changed());
        assert_eq!(
            scheduler.station_fetch_due(at(2026, 1, 10, 12, 0)),
            Some(StationFetchReason::NeverFetched)
        );
    }

    #[test]
    fn identical_parameters_do_not_arm_the_flag() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 12, 0);
        scheduler.record_station_fetch(now);
        scheduler.update_parameters(params());
        assert!(!scheduler.parameters_changed());
    }

    #[test]
    fn deadlines_land_on_midnight() {
        let mut scheduler = Scheduler::new(params());
        let now = at(2026, 1, 10, 15, 42);
        scheduler.record_station_fetch(now);
        scheduler.record_height_fetch(now);

        assert_eq!(
            scheduler.state().next_day_midnight,
            Some(at(2026, 1, 11, 0, 0))
        );
        assert_eq!(
            scheduler.state().next_long_deadline,
            Some(at(2026, 2, 9, 0, 0))
        );
    }
}
