//! # Tide Dataset Records and Decoder
//!
//! This module defines the typed records produced by one WorldTides fetch and
//! the pure decoder that turns a raw dataset into queryable tide facts.
//!
//! ## Decoder Contract
//!
//! Every accessor returns a typed result; nothing here panics or throws.
//! A missing dataset, an empty station list or a timestamp outside the
//! prediction window all narrow to a [`TideError`] variant the caller can
//! branch on. Extrema are assumed ascending by timestamp (service-guaranteed
//! ordering); the decoder does not re-sort defensively.
//!
//! ## Scan Semantics
//!
//! `next_extremum(now, forward = true)` returns the extremum with the
//! smallest timestamp strictly greater than `now`; `forward = false` returns
//! the one with the greatest timestamp strictly less than `now`. A timestamp
//! exactly equal to `now` is neither future nor past. `current_height` is a
//! step function: the sample with the greatest timestamp at or before `now`,
//! never interpolated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Datum name used as the upper bound of the mean spring range.
pub const DATUM_MHWS: &str = "MHWS";
/// Datum name used as the lower bound of the mean spring range.
pub const DATUM_MLWS: &str = "MLWS";

/// Prefix the service puts in front of the base64 plot payload.
const PLOT_HEADER: &str = "data:image/png;base64,";

/// Errors reported by the tide decoder.
///
/// These are ordinary typed results, not failures: a caller asking for the
/// next tide at the very edge of the prediction window is expected to see
/// `NoFutureData` and degrade that one value to "unavailable".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TideError {
    /// No dataset has been fetched yet (or the cache was unusable)
    #[error("no tide dataset available")]
    NoData,

    /// No extremum lies after the requested time within the window
    #[error("no tide extremum after the requested time")]
    NoFutureData,

    /// No extremum (or height sample) lies before the requested time
    #[error("no tide extremum before the requested time")]
    NoPastData,

    /// The station list is empty or no station was matched
    #[error("no tide station within the search radius")]
    NoStation,

    /// A named datum offset is absent from the dataset
    #[error("datum offset {0} missing")]
    MissingDatum(&'static str),

    /// MHWS equals MLWS, the coefficient denominator is zero
    #[error("mean spring range is zero")]
    ZeroSpringRange,

    /// The dataset carries no plot payload
    #[error("no plot image in dataset")]
    NoPlot,
}

/// Whether an extremum is a high or a low water event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumKind {
    High,
    Low,
}

/// A single high or low tide event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TideExtremum {
    /// Event time as Unix epoch seconds
    pub timestamp: i64,
    /// Height in meters relative to the dataset's vertical reference
    pub height: f64,
    /// High or low water
    pub kind: ExtremumKind,
}

/// One fixed-interval height sample (service step, typically 900 s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightSample {
    /// Sample time as Unix epoch seconds
    pub timestamp: i64,
    /// Height in meters relative to the dataset's vertical reference
    pub height: f64,
}

/// A tide station known to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name, when the service knows it
    pub timezone: Option<String>,
}

/// Height offsets of named reference planes (MHWS, MLWS, ...) against the
/// dataset's vertical reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatumOffsets(pub BTreeMap<String, f64>);

impl DatumOffsets {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// The (MHWS, MLWS) pair, when both are present.
    pub fn mean_spring_pair(&self) -> Result<(f64, f64), TideError> {
        let mhws = self
            .get(DATUM_MHWS)
            .ok_or(TideError::MissingDatum(DATUM_MHWS))?;
        let mlws = self
            .get(DATUM_MLWS)
            .ok_or(TideError::MissingDatum(DATUM_MLWS))?;
        Ok((mhws, mlws))
    }
}

/// Everything one successful height/extrema fetch produced.
///
/// Replaced wholesale on the next successful fetch, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTideDataset {
    /// Vertical reference plane the heights are expressed against
    pub response_datum: Option<String>,
    /// Name of the station the service actually used, if any
    pub station: Option<String>,
    /// Stations within the search radius, nearest first
    pub stations: Vec<StationInfo>,
    /// High/low events, ascending by timestamp
    pub extrema: Vec<TideExtremum>,
    /// Fixed-interval height series, ascending by timestamp
    pub heights: Vec<HeightSample>,
    /// Datum offsets, present only when the fetch requested them
    pub datums: Option<DatumOffsets>,
    /// Plot PNG as base64, still carrying the data-URL header
    pub plot: Option<String>,
    /// Credits the service charged for this call
    pub call_count: u32,
}

/// Result of one station lookup; refreshed far less often than heights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDataset {
    /// Stations within the search radius, nearest first
    pub stations: Vec<StationInfo>,
    /// Credits the service charged for this call
    pub call_count: u32,
}

/// The bracketing high/low pair around a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighLowPair {
    pub high: TideExtremum,
    pub low: TideExtremum,
}

/// Decoder over one (possibly absent) raw dataset.
///
/// Borrow-only view: construct it per query with [`decode`], it holds no
/// state of its own.
#[derive(Debug, Clone, Copy)]
pub struct TideInfo<'a> {
    data: Option<&'a RawTideDataset>,
}

/// Wrap a raw dataset (or its absence) into the decoder.
pub fn decode(data: Option<&RawTideDataset>) -> TideInfo<'_> {
    TideInfo { data }
}

impl<'a> TideInfo<'a> {
    fn dataset(&self) -> Result<&'a RawTideDataset, TideError> {
        self.data.ok_or(TideError::NoData)
    }

    /// The next (or previous) extremum relative to `now`.
    pub fn next_extremum(&self, now: i64, forward: bool) -> Result<TideExtremum, TideError> {
        let extrema = &self.dataset()?.extrema;
        if forward {
            // smallest timestamp strictly greater than now
            let idx = extrema.partition_point(|e| e.timestamp <= now);
            extrema.get(idx).copied().ok_or(TideError::NoFutureData)
        } else {
            // greatest timestamp strictly less than now
            let idx = extrema.partition_point(|e| e.timestamp < now);
            if idx == 0 {
                return Err(TideError::NoPastData);
            }
            Ok(extrema[idx - 1])
        }
    }

    /// The high/low pair bracketing `now`, ordered by kind.
    ///
    /// The pair is the last extremum before `now` and the first after it.
    /// When `now` precedes the whole window, the first two entries stand in
    /// for a forward query. `forward` selects which missing side is an error.
    pub fn next_high_low(&self, now: i64, forward: bool) -> Result<HighLowPair, TideError> {
        let extrema = &self.dataset()?.extrema;
        let after = extrema.partition_point(|e| e.timestamp <= now);

        let (first, second) = if after == 0 {
            if !forward {
                return Err(TideError::NoPastData);
            }
            (0, 1)
        } else {
            (after - 1, after)
        };

        let a = *extrema.get(first).ok_or(TideError::NoFutureData)?;
        let b = *extrema.get(second).ok_or(TideError::NoFutureData)?;

        // Extrema alternate, so exactly one of the pair is a High.
        if a.kind == ExtremumKind::High {
            Ok(HighLowPair { high: a, low: b })
        } else {
            Ok(HighLowPair { high: b, low: a })
        }
    }

    /// Height of the bracketing tide cycle: |high − low|.
    pub fn amplitude(&self, now: i64, forward: bool) -> Result<f64, TideError> {
        let pair = self.next_high_low(now, forward)?;
        Ok((pair.high.height - pair.low.height).abs())
    }

    /// The height sample with the greatest timestamp at or before `now`.
    pub fn current_height(&self, now: i64) -> Result<HeightSample, TideError> {
        let heights = &self.dataset()?.heights;
        let idx = heights.partition_point(|s| s.timestamp <= now);
        if idx == 0 {
            return Err(TideError::NoPastData);
        }
        Ok(heights[idx - 1])
    }

    /// The vertical reference plane heights are expressed against.
    pub fn vertical_reference(&self) -> Result<&'a str, TideError> {
        self.dataset()?
            .response_datum
            .as_deref()
            .ok_or(TideError::NoData)
    }

    /// Name of the station the service used for this dataset.
    pub fn station_used(&self) -> Result<&'a str, TideError> {
        self.dataset()?
            .station
            .as_deref()
            .ok_or(TideError::NoStation)
    }

    /// Stations within the search radius, nearest first.
    pub fn stations_nearby(&self) -> Result<&'a [StationInfo], TideError> {
        let stations = &self.dataset()?.stations;
        if stations.is_empty() {
            return Err(TideError::NoStation);
        }
        Ok(stations)
    }

    /// Timezone of the nearest station (the service lists nearest first).
    pub fn nearest_station_timezone(&self) -> Result<&'a str, TideError> {
        self.stations_nearby()?[0]
            .timezone
            .as_deref()
            .ok_or(TideError::NoStation)
    }

    /// Datum offsets carried by this dataset, if any were requested.
    pub fn datum_offsets(&self) -> Result<&'a DatumOffsets, TideError> {
        self.dataset()?
            .datums
            .as_ref()
            .ok_or(TideError::MissingDatum(DATUM_MHWS))
    }

    /// Base64 plot payload with the data-URL header stripped.
    pub fn plot_image(&self) -> Result<&'a str, TideError> {
        let plot = self.dataset()?.plot.as_deref().ok_or(TideError::NoPlot)?;
        Ok(plot.strip_prefix(PLOT_HEADER).unwrap_or(plot))
    }
}

/// Tidal coefficient: the cycle amplitude as a percentage of the mean spring
/// range (MHWS − MLWS).
///
/// An equal MHWS/MLWS pair is a `ZeroSpringRange` error, never a NaN.
pub fn tidal_coefficient(amplitude: f64, datums: &DatumOffsets) -> Result<f64, TideError> {
    let (mhws, mlws) = datums.mean_spring_pair()?;
    let spring_range = mhws - mlws;
    if spring_range == 0.0 {
        return Err(TideError::ZeroSpringRange);
    }
    Ok(amplitude / spring_range * 100.0)
}
