//! # Data Coordinator
//!
//! One coordinator per monitored location: it owns the scheduler, the signed
//! cache, the current/previous dataset pair and the credit counters, and
//! drives one fetch cycle per [`DataCoordinator::update`] call.
//!
//! `update()` is not internally reentrant-safe and carries no lock; callers
//! must serialize invocations per coordinator (the registry's `update_all`
//! does). Remote calls are awaited one at a time with the client's fixed
//! timeout; a failed call mutates nothing, so the scheduler re-issues the
//! same decision on the next externally-triggered cycle.
//!
//! The [`CoordinatorRegistry`] replaces a process-global location map: the
//! entry point builds one, registers every location, and reads the aggregate
//! credit spend from it.

use chrono::{DateTime, Local};
use std::collections::HashMap;

use crate::api::{ServerParameters, TideApi};
use crate::fallback::{decode_with_fallback, FallbackTideInfo};
use crate::scheduler::{Scheduler, SchedulerState};
use crate::storage::{CacheSnapshot, PlotFile, SignedCache};
use crate::tide_data::{decode, DatumOffsets, RawTideDataset, StationDataset, StationInfo};
use crate::{scheduler, tide_data};

/// The current/previous dataset pair.
///
/// `previous` only exists to bridge the query window across a day boundary;
/// it is never persisted past one rotation and is dropped entirely when the
/// parameter fingerprint changes.
#[derive(Debug, Default, Clone)]
pub struct DatasetHistory {
    current: Option<RawTideDataset>,
    previous: Option<RawTideDataset>,
}

impl DatasetHistory {
    pub fn current(&self) -> Option<&RawTideDataset> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&RawTideDataset> {
        self.previous.as_ref()
    }

    /// Install a dataset fetched under unchanged parameters: the old
    /// current becomes previous, the old previous is dropped.
    fn rotate(&mut self, dataset: RawTideDataset) {
        self.previous = self.current.take();
        self.current = Some(dataset);
    }

    /// Install a dataset fetched under a new fingerprint: the whole history
    /// belongs to a stale coordinate frame and is discarded.
    fn replace(&mut self, dataset: RawTideDataset) {
        self.previous = None;
        self.current = Some(dataset);
    }
}

/// Per-location façade over the scheduler, the cache and the remote service.
pub struct DataCoordinator<A> {
    api: A,
    scheduler: Scheduler,
    cache: SignedCache,
    plot: PlotFile,
    history: DatasetHistory,
    station_data: Option<StationDataset>,
    datums: Option<DatumOffsets>,
    credit_used: u32,
    total_credit_used: u64,
    restore_attempted: bool,
}

impl<A: TideApi> DataCoordinator<A> {
    pub fn new(api: A, params: ServerParameters, cache: SignedCache, plot: PlotFile) -> Self {
        DataCoordinator {
            api,
            scheduler: Scheduler::new(params),
            cache,
            plot,
            history: DatasetHistory::default(),
            station_data: None,
            datums: None,
            credit_used: 0,
            total_credit_used: 0,
            restore_attempted: false,
        }
    }

    /// Run one fetch cycle now.
    pub async fn update(&mut self) {
        self.update_at(Local::now()).await;
    }

    /// Run one fetch cycle at an explicit time.
    ///
    /// Station decision first, height decision second (a fresh station fetch
    /// forces the height fetch), then rotation, plot write and snapshot
    /// persist. Failures log and leave the corresponding deadline alone.
    pub async fn update_at(&mut self, now: DateTime<Local>) {
        self.credit_used = 0;

        // cold start: before spending credits on a station fetch, see if a
        // snapshot from a previous run still answers for this configuration
        if self.scheduler.station_fetch_due(now).is_some() && !self.restore_attempted {
            self.try_restore();
        }

        let mut station_fetched = false;
        if let Some(reason) = self.scheduler.station_fetch_due(now) {
            log::debug!("station data to be fetched: {reason}");
            match self.api.fetch_stations(self.scheduler.parameters()).await {
                Ok(dataset) => {
                    self.credit_used += dataset.call_count;
                    self.station_data = Some(dataset);
                    self.scheduler.record_station_fetch(now);
                    station_fetched = true;
                }
                Err(e) => log::error!("station fetch failed: {e}"),
            }
        }

        if let Some(reason) = self.scheduler.height_fetch_due(station_fetched, now) {
            log::debug!("height data to be fetched: {reason}");
            // datum offsets cost extra credits; only re-request them when
            // none are cached or the station context just moved
            let with_datums = self.datums.is_none() || station_fetched;
            match self
                .api
                .fetch_heights(self.scheduler.parameters(), with_datums)
                .await
            {
                Ok(dataset) => {
                    self.credit_used += dataset.call_count;
                    self.install_dataset(dataset);
                    self.scheduler.record_height_fetch(now);
                    if let Err(e) = self.cache.store(&self.snapshot()) {
                        log::warn!("snapshot persist failed: {e}");
                    }
                }
                Err(e) => log::error!("height fetch failed: {e}"),
            }
        } else {
            log::debug!("tide data does not need to be requeried at {now}");
        }

        self.total_credit_used += u64::from(self.credit_used);
    }

    fn install_dataset(&mut self, dataset: RawTideDataset) {
        if let Some(datums) = dataset.datums.clone() {
            self.datums = Some(datums);
        }

        match decode(Some(&dataset)).plot_image() {
            Ok(payload) => {
                if let Err(e) = self.plot.store_base64(payload) {
                    log::warn!("plot image persist failed: {e}");
                }
            }
            Err(_) => self.plot.remove(),
        }

        if self.scheduler.parameters_changed() {
            self.history.replace(dataset);
        } else {
            self.history.rotate(dataset);
        }
    }

    fn try_restore(&mut self) {
        self.restore_attempted = true;
        let Some(snapshot) = self.cache.fetch() else {
            return;
        };
        if !self.scheduler.snapshot_usable(&snapshot) {
            log::debug!("cached snapshot unusable (version or parameter mismatch)");
            return;
        }

        log::info!("seeding scheduler state from cached snapshot");
        self.scheduler.restore_state(snapshot.scheduler);
        self.station_data = snapshot.station_data;
        self.history = DatasetHistory {
            current: snapshot.current,
            previous: snapshot.previous,
        };
        self.datums = snapshot.datums;
    }

    fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            version: scheduler::SNAPSHOT_VERSION,
            parameters: self.scheduler.parameters().clone(),
            scheduler: self.scheduler.state().clone(),
            station_data: self.station_data.clone(),
            current: self.history.current.clone(),
            previous: self.history.previous.clone(),
            datums: self.datums.clone(),
        }
    }

    /// Re-point the location's reference coordinates. The fingerprint
    /// change is picked up by the scheduler on the next `update()`.
    pub fn change_reference_point(&mut self, latitude: f64, longitude: f64) {
        let params = self
            .scheduler
            .parameters()
            .with_coordinates(latitude, longitude);
        self.scheduler.update_parameters(params);
    }

    // -- Read surface for the presentation layer --

    /// Decoder over the current/previous dataset pair.
    pub fn tide_info(&self) -> FallbackTideInfo<'_> {
        decode_with_fallback(self.history.current(), self.history.previous())
    }

    /// Stations near the reference point, from the slow-moving station data.
    pub fn stations_nearby(&self) -> Result<&[StationInfo], tide_data::TideError> {
        let stations = self
            .station_data
            .as_ref()
            .ok_or(tide_data::TideError::NoData)?
            .stations
            .as_slice();
        if stations.is_empty() {
            return Err(tide_data::TideError::NoStation);
        }
        Ok(stations)
    }

    /// Latest datum offsets seen for this location.
    pub fn datum_offsets(&self) -> Option<&DatumOffsets> {
        self.datums.as_ref()
    }

    pub fn dataset_history(&self) -> &DatasetHistory {
        &self.history
    }

    pub fn scheduler_state(&self) -> &SchedulerState {
        self.scheduler.state()
    }

    pub fn server_parameters(&self) -> &ServerParameters {
        self.scheduler.parameters()
    }

    /// True until a height dataset has been obtained from any source.
    pub fn no_data(&self) -> bool {
        self.history.current().is_none()
    }

    /// Credits spent by the most recent `update()` cycle.
    pub fn credit_used(&self) -> u32 {
        self.credit_used
    }

    /// Credits spent by this coordinator since construction.
    pub fn total_credit_used(&self) -> u64 {
        self.total_credit_used
    }

    /// Where the plot image is written for this location.
    pub fn plot_path(&self) -> &std::path::Path {
        self.plot.path()
    }
}

/// Explicit registry of per-location coordinators.
///
/// Owned by the process entry point and passed by reference wherever the
/// coordinators are needed; there is no ambient global map.
pub struct CoordinatorRegistry<A> {
    coordinators: HashMap<String, DataCoordinator<A>>,
}

impl<A: TideApi> CoordinatorRegistry<A> {
    pub fn new() -> Self {
        CoordinatorRegistry {
            coordinators: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, coordinator: DataCoordinator<A>) {
        self.coordinators.insert(name.into(), coordinator);
    }

    pub fn get(&self, name: &str) -> Option<&DataCoordinator<A>> {
        self.coordinators.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataCoordinator<A>> {
        self.coordinators.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.coordinators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Run one update cycle for every location, serialized.
    pub async fn update_all(&mut self) {
        for (name, coordinator) in self.coordinators.iter_mut() {
            log::debug!("updating location {name}");
            coordinator.update().await;
        }
    }

    /// Credits spent across all locations since process start.
    pub fn total_credit_used(&self) -> u64 {
        self.coordinators
            .values()
            .map(DataCoordinator::total_credit_used)
            .sum()
    }
}

impl<A: TideApi> Default for CoordinatorRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}
