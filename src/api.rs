//! # WorldTides v2 Client
//!
//! The remote service exposes two logical read operations, both metered in
//! credits: a station lookup around a point, and an extremes+heights fetch
//! (optionally with datum offsets and a rendered plot). This module holds
//! the parameter fingerprint, the typed wire decode, and a small `reqwest`
//! client behind the [`TideApi`] trait so the coordinator can be exercised
//! against a mock.
//!
//! Responses are parsed once at this boundary into the typed records of
//! [`crate::tide_data`]; nothing downstream ever touches raw JSON.
//!
//! ## Failure Modes
//!
//! A timeout or connection failure is [`ApiError::Transport`]; an
//! undecodable body is [`ApiError::Malformed`]. Both degrade identically for
//! the caller: no state mutation, logged, retried on the next scheduled
//! cycle. There is no retry loop in here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::tide_data::{
    DatumOffsets, ExtremumKind, HeightSample, RawTideDataset, StationDataset, StationInfo,
    TideExtremum,
};

/// Fixed per-call timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Height sampling step requested from the service, in seconds.
pub const HEIGHT_STEP_SECONDS: u32 = 900;

/// Production endpoint.
const WORLDTIDES_BASE_URL: &str = "https://www.worldtides.info";

/// Errors from one remote call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Timeout, connection failure or HTTP-level error
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body received but not decodable as the expected shape
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Unit the remote plot renderer labels heights with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotUnit {
    Feet,
    Meters,
}

impl PlotUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            PlotUnit::Feet => "feet",
            PlotUnit::Meters => "meters",
        }
    }
}

/// The parameter fingerprint.
///
/// Two parameter sets are fingerprint-equal iff every field matches; the
/// derived `PartialEq` is that equality. The scheduler and the cache both
/// compare fingerprints to decide whether prior state is still meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerParameters {
    pub api_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vertical_ref: String,
    pub station_distance_km: f64,
    pub plot_color: String,
    pub plot_background: String,
    pub plot_unit: PlotUnit,
    pub prediction_days: u32,
}

impl ServerParameters {
    /// A copy of this fingerprint re-pointed at new coordinates.
    pub fn with_coordinates(&self, latitude: f64, longitude: f64) -> Self {
        ServerParameters {
            latitude,
            longitude,
            ..self.clone()
        }
    }
}

/// Seam between the coordinator and the remote service.
#[allow(async_fn_in_trait)]
pub trait TideApi {
    /// Station lookup around the fingerprint's point.
    async fn fetch_stations(&self, params: &ServerParameters)
        -> Result<StationDataset, ApiError>;

    /// Extremes + heights (+ plot) fetch; `with_datums` additionally
    /// requests datum offsets, which costs extra credits.
    async fn fetch_heights(
        &self,
        params: &ServerParameters,
        with_datums: bool,
    ) -> Result<RawTideDataset, ApiError>;
}

// -- Wire shapes --

#[derive(Debug, Deserialize)]
struct WireStation {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    timezone: Option<String>,
}

impl From<WireStation> for StationInfo {
    fn from(w: WireStation) -> Self {
        StationInfo {
            name: w.name,
            latitude: w.lat,
            longitude: w.lon,
            timezone: w.timezone,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStationsResponse {
    #[serde(rename = "callCount", default)]
    call_count: u32,
    #[serde(default)]
    stations: Vec<WireStation>,
}

#[derive(Debug, Deserialize)]
struct WireExtreme {
    dt: i64,
    height: f64,
    #[serde(rename = "type")]
    kind: ExtremumKind,
}

#[derive(Debug, Deserialize)]
struct WireHeight {
    dt: i64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct WireDatum {
    name: String,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct WireTideResponse {
    #[serde(rename = "callCount", default)]
    call_count: u32,
    #[serde(rename = "responseDatum", default)]
    response_datum: Option<String>,
    #[serde(default)]
    station: Option<String>,
    #[serde(default)]
    stations: Vec<WireStation>,
    #[serde(default)]
    extremes: Vec<WireExtreme>,
    #[serde(default)]
    heights: Vec<WireHeight>,
    #[serde(default)]
    datums: Option<Vec<WireDatum>>,
    #[serde(default)]
    plot: Option<String>,
}

impl From<WireTideResponse> for RawTideDataset {
    fn from(w: WireTideResponse) -> Self {
        RawTideDataset {
            response_datum: w.response_datum,
            station: w.station,
            stations: w.stations.into_iter().map(StationInfo::from).collect(),
            extrema: w
                .extremes
                .into_iter()
                .map(|e| TideExtremum {
                    timestamp: e.dt,
                    height: e.height,
                    kind: e.kind,
                })
                .collect(),
            heights: w
                .heights
                .into_iter()
                .map(|h| HeightSample {
                    timestamp: h.dt,
                    height: h.height,
                })
                .collect(),
            datums: w.datums.map(|datums| {
                DatumOffsets(
                    datums
                        .into_iter()
                        .map(|d| (d.name, d.height))
                        .collect::<BTreeMap<_, _>>(),
                )
            }),
            plot: w.plot,
            call_count: w.call_count,
        }
    }
}

// -- Client --

/// HTTP client for the WorldTides v2 API.
pub struct WorldTidesClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorldTidesClient {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(WORLDTIDES_BASE_URL)
    }

    /// Point the client at another endpoint (test servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(WorldTidesClient {
            http,
            base_url: base_url.into(),
        })
    }

    fn stations_url(&self, p: &ServerParameters) -> String {
        format!(
            "{}/api/v2?stations&key={}&lat={}&lon={}&stationDistance={}",
            self.base_url, p.api_key, p.latitude, p.longitude, p.station_distance_km
        )
    }

    fn heights_url(&self, p: &ServerParameters, with_datums: bool) -> String {
        let datums = if with_datums { "&datums" } else { "" };
        format!(
            "{}/api/v2?extremes&heights&plot&date=today&timemode=24&days={}&step={}\
             &key={}&lat={}&lon={}&datum={}&stationDistance={}&color={}&background={}&units={}{}",
            self.base_url,
            p.prediction_days,
            HEIGHT_STEP_SECONDS,
            p.api_key,
            p.latitude,
            p.longitude,
            p.vertical_ref,
            p.station_distance_km,
            p.plot_color,
            p.plot_background,
            p.plot_unit.as_str(),
            datums,
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        // fetch the body as text first so decode failures surface as
        // Malformed rather than a transport error
        let body = self.http.get(url).send().await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl TideApi for WorldTidesClient {
    async fn fetch_stations(
        &self,
        params: &ServerParameters,
    ) -> Result<StationDataset, ApiError> {
        let response: WireStationsResponse = self.get_json(self.stations_url(params)).await?;
        Ok(StationDataset {
            stations: response.stations.into_iter().map(StationInfo::from).collect(),
            call_count: response.call_count,
        })
    }

    async fn fetch_heights(
        &self,
        params: &ServerParameters,
        with_datums: bool,
    ) -> Result<RawTideDataset, ApiError> {
        let response: WireTideResponse =
            self.get_json(self.heights_url(params, with_datums)).await?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ServerParameters {
        ServerParameters {
            api_key: "secret-key".to_string(),
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

    #[test]
    fn fingerprint_equality_is_field_by_field() {
        let a = params();
        let b = a.clone();
        assert_eq!(a, b);

        let moved = a.with_coordinates(48.4, -4.495);
        assert_ne!(a, moved);
        assert_eq!(moved.latitude, 48.4);
        assert_eq!(moved.api_key, a.api_key);
    }

    #[test]
    fn request_urls_carry_all_parameters() {
        let client = WorldTidesClient::with_base_url("http://localhost:0").unwrap();
        let p = params();

        let url = client.stations_url(&p);
        assert!(url.contains("?stations&"));
        assert!(url.contains("key=secret-key"));
        assert!(url.contains("stationDistance=50"));

        let url = client.heights_url(&p, true);
        assert!(url.contains("extremes"));
        assert!(url.contains("heights"));
        assert!(url.contains("days=3"));
        assert!(url.contains("step=900"));
        assert!(url.contains("datum=LAT"));
        assert!(url.contains("units=meters"));
        assert!(url.ends_with("&datums"));

        let url = client.heights_url(&p, false);
        assert!(!url.contains("&datums"));
    }

    #[test]
    fn tide_response_decodes_into_typed_records() {
        let body = r#"{
            "callCount": 3,
            "responseDatum": "LAT",
            "station": "Brest",
            "stations": [{"name": "Brest", "lat": 48.383, "lon": -4.495, "timezone": "Europe/Paris"}],
            "extremes": [
                {"dt": 1000, "date": "2026-01-01T00:16+0000", "height": 0.2, "type": "Low"},
                {"dt": 2000, "date": "2026-01-01T00:33+0000", "height": 5.1, "type": "High"}
            ],
            "heights": [{"dt": 900, "date": "2026-01-01T00:15+0000", "height": 1.0}],
            "datums": [{"name": "MHWS", "height": 6.0}, {"name": "MLWS", "height": 1.0}],
            "plot": "data:image/png;base64,aGVsbG8="
        }"#;

        let wire: WireTideResponse = serde_json::from_str(body).unwrap();
        let dataset: RawTideDataset = wire.into();

        assert_eq!(dataset.call_count, 3);
        assert_eq!(dataset.extrema.len(), 2);
        assert_eq!(dataset.extrema[1].kind, ExtremumKind::High);
        assert_eq!(dataset.heights[0].timestamp, 900);
        assert_eq!(dataset.datums.as_ref().unwrap().get("MHWS"), Some(6.0));
        assert_eq!(dataset.station.as_deref(), Some("Brest"));
    }

    #[test]
    fn station_response_tolerates_missing_fields() {
        let body = r#"{"callCount": 1, "stations": [{"name": "Brest", "lat": 48.4, "lon": -4.5}]}"#;
        let wire: WireStationsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(wire.call_count, 1);
        assert_eq!(wire.stations[0].timezone, None);

        // an empty body section is a valid "nothing nearby" answer
        let wire: WireStationsResponse = serde_json::from_str(r#"{"callCount": 1}"#).unwrap();
        assert!(wire.stations.is_empty());
    }
}
