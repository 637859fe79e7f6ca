//! # Tide Watch Core Library
//!
//! This library implements a credit-aware polling cache over the WorldTides
//! prediction service. The service bills by "credits" per request, so the
//! whole design is organized around spending as few of them as possible
//! while keeping a usable prediction window available at all times.
//!
//! ## Data Flow
//!
//! 1. **Schedule**: the [`scheduler`] decides, per location, whether station
//!    metadata (~30-day cadence) or height/extrema data (~daily cadence)
//!    must be re-fetched, and records why.
//! 2. **Fetch**: the [`api`] client talks to the WorldTides v2 endpoints and
//!    maps the wire JSON into owned datasets.
//! 3. **Cache**: every successful cycle is persisted through [`storage`] as
//!    an HMAC-signed snapshot, so a process restart resumes without
//!    spending credits; the plot PNG is written alongside it.
//! 4. **Decode**: [`tide_data`] answers point-in-time questions (next high,
//!    current height, tidal coefficient) against an immutable dataset, and
//!    [`fallback`] bridges the gap right after a day rollover by retrying
//!    against yesterday's dataset.
//!
//! The [`coordinator`] ties these together, one instance per monitored
//! location, and [`position`] decides when a moving observer has drifted
//! far enough that the reference coordinates should be re-anchored.
//!
//! ## Credit Discipline
//!
//! - Station and datum requests are the expensive ones; both are gated
//!   (30-day deadline, datum re-request only when nothing is cached or the
//!   station context moved).
//! - Every response's `callCount` is accumulated per cycle and per process
//!   lifetime so the spend is always inspectable.
//! - A failed fetch advances nothing: the same decision fires again on the
//!   next cycle.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod fallback;
pub mod position;
pub mod scheduler;
pub mod storage;
pub mod tide_data;

pub use api::{ServerParameters, TideApi, WorldTidesClient};
pub use config::Config;
pub use coordinator::{CoordinatorRegistry, DataCoordinator};
pub use fallback::{decode_with_fallback, FallbackTideInfo};
pub use position::LivePosition;
pub use storage::{PlotFile, SignedCache};
pub use tide_data::{decode, tidal_coefficient, TideError, TideInfo};
