//! # Fallback Decoder Over the Dataset Pair
//!
//! The remote dataset is a rolling multi-day window. Right after a day
//! boundary, before the next scheduled fetch lands, the current dataset can
//! momentarily fail to cover "now". This module wraps the (current, previous)
//! pair: every accessor is tried on the current dataset first and retried on
//! the previous one only when the first attempt returned an error, so the
//! still-overlapping previous window bridges the gap without a visible hole.
//!
//! The previous dataset is discarded whenever the server parameters change;
//! its coordinate frame is no longer comparable and falling back to it would
//! silently mix reference planes.

use crate::tide_data::{
    decode, DatumOffsets, HeightSample, HighLowPair, RawTideDataset, StationInfo, TideError,
    TideExtremum, TideInfo,
};

/// Decoder over the (current, previous) dataset pair.
#[derive(Debug, Clone, Copy)]
pub struct FallbackTideInfo<'a> {
    current: TideInfo<'a>,
    previous: TideInfo<'a>,
}

/// Wrap a current/previous dataset pair into the fallback decoder.
pub fn decode_with_fallback<'a>(
    current: Option<&'a RawTideDataset>,
    previous: Option<&'a RawTideDataset>,
) -> FallbackTideInfo<'a> {
    FallbackTideInfo {
        current: decode(current),
        previous: decode(previous),
    }
}

impl<'a> FallbackTideInfo<'a> {
    fn try_both<T>(
        &self,
        op: impl Fn(&TideInfo<'a>) -> Result<T, TideError>,
    ) -> Result<T, TideError> {
        op(&self.current).or_else(|_| op(&self.previous))
    }

    pub fn next_extremum(&self, now: i64, forward: bool) -> Result<TideExtremum, TideError> {
        self.try_both(|info| info.next_extremum(now, forward))
    }

    pub fn next_high_low(&self, now: i64, forward: bool) -> Result<HighLowPair, TideError> {
        self.try_both(|info| info.next_high_low(now, forward))
    }

    pub fn amplitude(&self, now: i64, forward: bool) -> Result<f64, TideError> {
        self.try_both(|info| info.amplitude(now, forward))
    }

    pub fn current_height(&self, now: i64) -> Result<HeightSample, TideError> {
        self.try_both(|info| info.current_height(now))
    }

    pub fn vertical_reference(&self) -> Result<&'a str, TideError> {
        self.try_both(|info| info.vertical_reference())
    }

    pub fn station_used(&self) -> Result<&'a str, TideError> {
        self.try_both(|info| info.station_used())
    }

    pub fn stations_nearby(&self) -> Result<&'a [StationInfo], TideError> {
        self.try_both(|info| info.stations_nearby())
    }

    pub fn nearest_station_timezone(&self) -> Result<&'a str, TideError> {
        self.try_both(|info| info.nearest_station_timezone())
    }

    pub fn datum_offsets(&self) -> Result<&'a DatumOffsets, TideError> {
        self.try_both(|info| info.datum_offsets())
    }

    pub fn plot_image(&self) -> Result<&'a str, TideError> {
        self.try_both(|info| info.plot_image())
    }
}
