//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! tide-watch.toml file. It provides a centralized way to configure the
//! WorldTides account, the monitored location, cache paths and the
//! live-position tracker.
//!
//! Distances in the file are expressed in the configured display unit
//! (kilometers for metric, miles for imperial) and converted to kilometers
//! before they reach the server or the position tracker.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::{PlotUnit, ServerParameters};

/// Kilometers per statute mile.
pub const KM_PER_MI: f64 = 1.609_344;
/// Feet per meter.
pub const FT_PER_M: f64 = 3.280_839_895_013_123;

/// Unit system used for display and for distances in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    Metric,
    Imperial,
}

impl DisplayUnit {
    /// Convert a distance expressed in this unit system to kilometers.
    pub fn distance_to_km(self, value: f64) -> f64 {
        match self {
            DisplayUnit::Metric => value,
            DisplayUnit::Imperial => value * KM_PER_MI,
        }
    }

    /// Height conversion factor applied when reporting meters to the user.
    pub fn height_factor(self) -> f64 {
        match self {
            DisplayUnit::Metric => 1.0,
            DisplayUnit::Imperial => FT_PER_M,
        }
    }

    /// The unit the remote plot renderer should label heights with.
    pub fn plot_unit(self) -> PlotUnit {
        match self {
            DisplayUnit::Metric => PlotUnit::Meters,
            DisplayUnit::Imperial => PlotUnit::Feet,
        }
    }
}

/// Application configuration loaded from tide-watch.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// WorldTides account and monitored location
    pub server: ServerConfig,
    /// Cache and plot file locations
    pub cache: CacheConfig,
    /// Moving-location re-anchor settings
    pub live_position: LivePositionConfig,
}

/// WorldTides server and location configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// WorldTides API key (credits are charged against this key)
    pub api_key: String,
    /// Logical location name, used for cache and plot file names
    pub name: String,
    /// Reference latitude in decimal degrees
    pub latitude: f64,
    /// Reference longitude in decimal degrees
    pub longitude: f64,
    /// Tidal height reference plane (e.g. "LAT", "MSL")
    pub vertical_ref: String,
    /// Station search radius, in the display unit
    pub station_distance: f64,
    /// Plot curve color as "r,g,b"
    pub plot_color: String,
    /// Plot background color as "r,g,b"
    pub plot_background: String,
    /// Display unit system
    pub unit: DisplayUnit,
    /// Prediction window in days; 3 straddles midnight on both sides
    pub prediction_days: u32,
}

/// Cache file configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Directory holding the snapshot blob and the plot image
    pub directory: PathBuf,
}

/// Live position tracker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivePositionConfig {
    /// Distance from the reference point that forces a re-anchor,
    /// in the display unit
    pub update_distance: f64,
    /// Re-anchor ceiling in hours, applied even when standing still
    pub max_ref_age_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                api_key: String::new(),
                name: "home".to_string(),
                latitude: 48.383,
                longitude: -4.495,
                vertical_ref: "LAT".to_string(),
                station_distance: 50.0,
                plot_color: "2,102,255".to_string(),
                plot_background: "255,255,255".to_string(),
                unit: DisplayUnit::Metric,
                prediction_days: 3,
            },
            cache: CacheConfig {
                directory: PathBuf::from("."),
            },
            live_position: LivePositionConfig {
                update_distance: 50.0,
                max_ref_age_hours: 6,
            },
        }
    }
}

impl Config {
    /// Load configuration from tide-watch.toml in the working directory.
    /// Falls back to default configuration if the file is missing or invalid.
    pub fn load() -> Self {
        Self::load_from_path("tide-watch.toml")
    }

    /// Load configuration from the specified path.
    /// Falls back to default configuration if the file is missing or invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    log::info!("loaded configuration for location: {}", config.server.name);
                    config
                }
                Err(e) => {
                    log::warn!("invalid config file format: {e}; using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save current configuration to tide-watch.toml
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write("tide-watch.toml", contents)?;
        Ok(())
    }

    /// Build the server parameter fingerprint from this configuration.
    ///
    /// Station distance is converted into kilometers here; the fingerprint
    /// always carries server-side units.
    pub fn server_parameters(&self) -> ServerParameters {
        ServerParameters {
            api_key: self.server.api_key.clone(),
            latitude: self.server.latitude,
            longitude: self.server.longitude,
            vertical_ref: self.server.vertical_ref.clone(),
            station_distance_km: self.server.unit.distance_to_km(self.server.station_distance),
            plot_color: self.server.plot_color.clone(),
            plot_background: self.server.plot_background.clone(),
            plot_unit: self.server.unit.plot_unit(),
            prediction_days: self.server.prediction_days,
        }
    }

    /// Path of the signed snapshot blob for this location.
    pub fn snapshot_path(&self) -> PathBuf {
        self.cache
            .directory
            .join(format!("{}.ser", self.server.name))
    }

    /// Path of the persisted plot image for this location.
    pub fn plot_path(&self) -> PathBuf {
        self.cache
            .directory
            .join(format!("{}.png", self.server.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.vertical_ref, "LAT");
        assert_eq!(config.server.station_distance, 50.0);
        assert_eq!(config.server.prediction_days, 3);
        assert_eq!(config.server.unit, DisplayUnit::Metric);
        assert_eq!(config.live_position.max_ref_age_hours, 6);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.name, parsed.server.name);
        assert_eq!(config.server.vertical_ref, parsed.server.vertical_ref);
        assert_eq!(config.server.unit, parsed.server.unit);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fall back to default
        assert_eq!(config.server.vertical_ref, "LAT");
    }

    #[test]
    fn test_imperial_distance_conversion() {
        let mut config = Config::default();
        config.server.unit = DisplayUnit::Imperial;
        let params = config.server_parameters();
        // 50 miles in kilometers
        assert!((params.station_distance_km - 80.4672).abs() < 1e-6);
        assert_eq!(params.plot_unit, PlotUnit::Feet);
    }

    #[test]
    fn test_cache_paths_use_location_name() {
        let config = Config::default();
        assert!(config.snapshot_path().ends_with("home.ser"));
        assert!(config.plot_path().ends_with("home.png"));
    }
}
