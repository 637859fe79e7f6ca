//! # Tide Watch Application Entry Point
//!
//! This binary wires the library together for a single monitored location:
//! load the configuration, run one credit-metered update cycle against the
//! WorldTides service (or the local cache, when it still answers), and
//! print a tide report to stdout.
//!
//! Run with an optional config path: `tide-watch [path/to/config.toml]`.

use std::env;

use chrono::{Local, TimeZone};
use tide_watch_lib::config::Config;
use tide_watch_lib::tide_data::{tidal_coefficient, ExtremumKind};
use tide_watch_lib::{
    CoordinatorRegistry, DataCoordinator, PlotFile, SignedCache, WorldTidesClient,
};

/// Format an epoch timestamp in local time for the report.
fn local_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => format!("@{timestamp}"),
    }
}

fn print_report(coordinator: &DataCoordinator<WorldTidesClient>, height_factor: f64, unit: &str) {
    let info = coordinator.tide_info();
    let now = Local::now().timestamp();

    println!("Tide report ({})", local_time(now));

    match info.current_height(now) {
        Ok(sample) => println!(
            "  current height: {:.2} {unit}",
            sample.height * height_factor
        ),
        Err(e) => println!("  current height: unavailable ({e})"),
    }

    match info.next_extremum(now, true) {
        Ok(next) => {
            let label = match next.kind {
                ExtremumKind::High => "next high",
                ExtremumKind::Low => "next low",
            };
            println!(
                "  {label}: {:.2} {unit} at {}",
                next.height * height_factor,
                local_time(next.timestamp)
            );
        }
        Err(e) => println!("  next extremum: unavailable ({e})"),
    }

    match info.amplitude(now, true) {
        Ok(amplitude) => {
            println!("  amplitude: {:.2} {unit}", amplitude * height_factor);
            match coordinator.datum_offsets() {
                Some(datums) => match tidal_coefficient(amplitude, datums) {
                    Ok(coefficient) => println!("  coefficient: {coefficient:.0}"),
                    Err(e) => println!("  coefficient: unavailable ({e})"),
                },
                None => println!("  coefficient: unavailable (no datum offsets)"),
            }
        }
        Err(e) => println!("  amplitude: unavailable ({e})"),
    }

    match info.station_used() {
        Ok(station) => println!("  station: {station}"),
        Err(_) => println!("  station: none (interpolated prediction)"),
    }

    if let Ok(reference) = info.vertical_reference() {
        println!("  vertical reference: {reference}");
    }

    if coordinator.plot_path().is_file() {
        println!("  plot image: {}", coordinator.plot_path().display());
    }

    println!(
        "  credits: {} this cycle, {} total",
        coordinator.credit_used(),
        coordinator.total_credit_used()
    );
}

fn main() -> anyhow::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    if config.server.api_key.is_empty() {
        anyhow::bail!("no API key configured; set server.api_key in tide-watch.toml");
    }

    let coordinator = DataCoordinator::new(
        WorldTidesClient::new()?,
        config.server_parameters(),
        SignedCache::new(config.snapshot_path(), &config.server.api_key),
        PlotFile::new(config.plot_path()),
    );

    let mut registry = CoordinatorRegistry::new();
    registry.register(config.server.name.clone(), coordinator);

    // Single-shot update: scheduling decides whether any credits are spent
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(registry.update_all());

    let coordinator = registry
        .get(&config.server.name)
        .ok_or_else(|| anyhow::anyhow!("location {} not registered", config.server.name))?;

    if coordinator.no_data() {
        eprintln!("no tide data available (fetch failed and no usable cache)");
    }

    print_report(
        coordinator,
        config.server.unit.height_factor(),
        match config.server.unit {
            tide_watch_lib::config::DisplayUnit::Metric => "m",
            tide_watch_lib::config::DisplayUnit::Imperial => "ft",
        },
    );

    Ok(())
}
