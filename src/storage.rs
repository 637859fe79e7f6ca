//! # Persistent Storage
//!
//! Two small pieces of filesystem state per location:
//!
//! - the **signed snapshot blob**: the scheduler snapshot serialized to
//!   JSON, authenticated with HMAC-SHA256 keyed by the API key, written as
//!   one file. The keyed hash guards against partial writes, corruption and
//!   cross-location/key reuse, not against an attacker holding the key. Any
//!   read, verify or decode failure degrades to a plain cache miss;
//! - the **plot image**: the base64 PNG the service renders, decoded and
//!   written next to the snapshot for an external presenter to pick up.
//!
//! The blob write is not transactional across crashes. A crash mid-write
//! yields either the old blob or a corrupted one, and the corrupted case is
//! indistinguishable from tampering; both read back as a miss.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::api::ServerParameters;
use crate::scheduler::SchedulerState;
use crate::tide_data::{DatumOffsets, RawTideDataset, StationDataset};

type HmacSha256 = Hmac<Sha256>;

/// Errors while persisting state. Reads never produce these; a failed read
/// is a miss by design.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage IO: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("plot payload decode: {0}")]
    PlotDecode(#[from] base64::DecodeError),
}

/// Everything needed to resume scheduling after a restart without spending
/// credits: written after every successful fetch cycle, read once at cold
/// start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Schema version; checked against [`crate::scheduler::SNAPSHOT_VERSION`]
    pub version: u32,
    /// Fingerprint the datasets were fetched under
    pub parameters: ServerParameters,
    /// Scheduler bookkeeping
    pub scheduler: SchedulerState,
    /// Station metadata
    pub station_data: Option<StationDataset>,
    /// Current height/extrema dataset
    pub current: Option<RawTideDataset>,
    /// Previous dataset kept to bridge the day boundary
    pub previous: Option<RawTideDataset>,
    /// Latest datum offsets seen
    pub datums: Option<DatumOffsets>,
}

/// On-disk envelope: hex HMAC over the serialized snapshot bytes.
#[derive(Serialize, Deserialize)]
struct SignedBlob {
    mac: String,
    payload: String,
}

fn sign(key: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length, new_from_slice cannot fail here
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Keyed-hash-protected snapshot file for one location.
pub struct SignedCache {
    path: PathBuf,
    key: String,
}

impl SignedCache {
    /// `key` is the location's API key, standing in for a per-location
    /// capability: a snapshot written under another key reads as a miss.
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        SignedCache {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize, sign and persist the snapshot, overwriting any prior file.
    pub fn store(&self, snapshot: &CacheSnapshot) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot)?;
        let blob = SignedBlob {
            mac: sign(&self.key, payload.as_bytes()),
            payload,
        };
        fs::write(&self.path, serde_json::to_vec(&blob)?)?;
        Ok(())
    }

    /// Read back the snapshot. Every failure mode (missing file, broken
    /// envelope, MAC mismatch, undecodable payload) is a miss.
    pub fn fetch(&self) -> Option<CacheSnapshot> {
        let bytes = fs::read(&self.path).ok()?;
        let blob: SignedBlob = match serde_json::from_slice(&bytes) {
            Ok(blob) => blob,
            Err(e) => {
                log::debug!("snapshot envelope unreadable: {e}");
                return None;
            }
        };

        if sign(&self.key, blob.payload.as_bytes()) != blob.mac {
            log::debug!("snapshot MAC mismatch, treating as miss");
            return None;
        }

        match serde_json::from_str(&blob.payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::debug!("snapshot payload undecodable: {e}");
                None
            }
        }
    }
}

/// Plot PNG persistence for one location.
pub struct PlotFile {
    path: PathBuf,
}

impl PlotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PlotFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the base64 payload (header already stripped) and write it.
    pub fn store_base64(&self, payload: &str) -> Result<(), StorageError> {
        let image = BASE64.decode(payload)?;
        fs::write(&self.path, image)?;
        Ok(())
    }

    /// Remove a stale image, ignoring an already-absent file.
    pub fn remove(&self) {
        if self.path.is_file() {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("could not remove stale plot {}: {e}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PlotUnit;
    use tempfile::tempdir;

    fn params(api_key: &str) -> ServerParameters {
        ServerParameters {
            api_key: api_key.to_string(),
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

    fn snapshot(api_key: &str) -> CacheSnapshot {
        CacheSnapshot {
            version: crate::scheduler::SNAPSHOT_VERSION,
            parameters: params(api_key),
            scheduler: SchedulerState::default(),
            station_data: Some(StationDataset {
                stations: vec![],
                call_count: 1,
            }),
            current: None,
            previous: None,
            datums: None,
        }
    }

    #[test]
    fn store_then_fetch_roundtrips() {
        let dir = tempdir().unwrap();
        let cache = SignedCache::new(dir.path().join("loc.ser"), "secret");

        let snap = snapshot("secret");
        cache.store(&snap).unwrap();

        let read = cache.fetch().expect("snapshot should read back");
        assert_eq!(read, snap);
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = SignedCache::new(dir.path().join("absent.ser"), "secret");
        assert!(cache.fetch().is_none());
    }

    #[test]
    fn wrong_key_is_a_miss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loc.ser");

        SignedCache::new(&path, "key-one")
            .store(&snapshot("key-one"))
            .unwrap();

        assert!(SignedCache::new(&path, "key-two").fetch().is_none());
    }

    #[test]
    fn corrupted_blob_is_a_miss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loc.ser");
        let cache = SignedCache::new(&path, "secret");

        cache.store(&snapshot("secret")).unwrap();

        // flip bytes in the middle of the file, as a torn write would
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(cache.fetch().is_none());
    }

    #[test]
    fn store_overwrites_prior_blob() {
        let dir = tempdir().unwrap();
        let cache = SignedCache::new(dir.path().join("loc.ser"), "secret");

        let mut snap = snapshot("secret");
        cache.store(&snap).unwrap();
        snap.datums = Some(DatumOffsets(
            [("MHWS".to_string(), 6.0)].into_iter().collect(),
        ));
        cache.store(&snap).unwrap();

        assert_eq!(cache.fetch().unwrap().datums, snap.datums);
    }

    #[test]
    fn plot_file_roundtrip_and_removal() {
        let dir = tempdir().unwrap();
        let plot = PlotFile::new(dir.path().join("loc.png"));

        plot.store_base64("aGVsbG8=").unwrap();
        assert_eq!(fs::read(plot.path()).unwrap(), b"hello");

        plot.remove();
        assert!(!plot.path().exists());

        // removing twice is fine
        plot.remove();
    }

    #[test]
    fn invalid_base64_is_an_error_not_a_write() {
        let dir = tempdir().unwrap();
        let plot = PlotFile::new(dir.path().join("loc.png"));
        assert!(plot.store_base64("not base64 !!!").is_err());
        assert!(!plot.path().exists());
    }
}
