// src/main.rs

mod classification;
mod config;
mod db;
mod detection;
mod frame_source;
mod preprocessing;
mod tracking;
mod types;
mod zone;

use anyhow::{Context, Result};
use classification::ClassPolicy;
use db::Database;
use preprocessing::NormalizerParams;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use types::Config;
use zone::PassStats;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("bubble_metrics={}", config.logging.level))
        .init();

    info!("🫧 Bubble Metrics Pipeline Starting");
    info!(
        "Capture: {} fps, {} px/mm | pairing: {:?}",
        config.capture.fps, config.capture.px_per_mm, config.tracking.pairing
    );

    let database = Database::open(Path::new(&config.data.db_path))?;

    let run_dirs = sorted_subdirs(Path::new(&config.data.input_dir))?;
    if run_dirs.is_empty() {
        error!("No run folders found in {}", config.data.input_dir);
        return Ok(());
    }
    info!("Found {} run folder(s) to process", run_dirs.len());

    let started = Instant::now();
    let mut stats = ProcessingStats::default();

    for run_dir in &run_dirs {
        let run_name = dir_name(run_dir);
        let run_id = database.insert_run(&run_name)?;
        info!("Processing run '{run_name}' (id {run_id})");

        for zone_dir in sorted_subdirs(run_dir)? {
            let zone_name = dir_name(&zone_dir);
            match process_zone(&config, &zone_dir, &run_name, &zone_name).await {
                Ok((metrics, zone_stats)) => {
                    database
                        .insert_zone_metrics(run_id, &metrics)
                        .context("persisting zone metrics")?;
                    stats.zones_processed += 1;
                    stats.rows_written += 1;
                    stats.frames_read += zone_stats.frames;
                    stats.frames_skipped += zone_stats.skipped;
                    if zone_stats.frames == 0 {
                        stats.empty_zones += 1;
                    }
                    info!(
                        "✓ {run_name}/{zone_name}: counts [{:.2} {:.2} {:.2}] velocities [{:.3} {:.3} {:.3}] m/s",
                        metrics.avg_small_count,
                        metrics.avg_medium_count,
                        metrics.avg_large_count,
                        metrics.avg_small_velocity,
                        metrics.avg_medium_velocity,
                        metrics.avg_large_velocity,
                    );
                }
                Err(e) => {
                    // a broken zone degrades to nothing, never aborts its siblings
                    warn!("zone {run_name}/{zone_name} failed: {e:#}");
                    stats.zones_failed += 1;
                }
            }
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    info!("📊 Final Report:");
    info!("  Zones processed: {}", stats.zones_processed);
    info!("  Zones failed: {}", stats.zones_failed);
    info!("  Empty zones: {}", stats.empty_zones);
    info!("  Frames read: {}", stats.frames_read);
    info!("  Frames skipped: {}", stats.frames_skipped);
    info!("  Rows written: {}", stats.rows_written);
    info!(
        "  Elapsed: {:.1}s ({:.1} frames/s)",
        elapsed,
        stats.frames_read as f64 / elapsed.max(0.001)
    );

    Ok(())
}

#[derive(Debug, Default)]
struct ProcessingStats {
    zones_processed: usize,
    zones_failed: usize,
    empty_zones: usize,
    frames_read: usize,
    frames_skipped: usize,
    rows_written: usize,
}

/// Run the counting and tracking passes for one zone concurrently and join
/// the results into a ZoneMetrics record. Both passes read the same
/// immutable frame sequence but keep disjoint state and disjoint output
/// fields, so the only synchronization needed is the final join.
async fn process_zone(
    config: &Config,
    zone_dir: &Path,
    run_name: &str,
    zone_name: &str,
) -> Result<(types::ZoneMetrics, PassStats)> {
    let params = NormalizerParams {
        refine: config.preprocessing.refine,
        ..NormalizerParams::default()
    };
    let counting_policy = ClassPolicy::from_thresholds(config.classes.counting);
    let tracking_policy = ClassPolicy::from_thresholds(config.classes.tracking);

    let count_dir = zone_dir.to_path_buf();
    let count_params = params.clone();
    let counting = tokio::task::spawn_blocking(move || {
        zone::count_pass(&count_dir, counting_policy, &count_params)
    });

    let track_dir = zone_dir.to_path_buf();
    let track_params = params.clone();
    let fps = config.capture.fps;
    let px_per_mm = config.capture.px_per_mm;
    let pairing = config.tracking.pairing;
    let tracking = tokio::task::spawn_blocking(move || {
        zone::track_pass(
            &track_dir,
            tracking_policy,
            &track_params,
            fps,
            px_per_mm,
            pairing,
        )
    });

    let (count_result, track_result) = tokio::try_join!(counting, tracking)?;
    let (counts, count_stats) = count_result?;
    let (velocities, track_stats) = track_result?;

    let stats = PassStats {
        frames: count_stats.frames.max(track_stats.frames),
        skipped: count_stats.skipped.max(track_stats.skipped),
    };
    Ok((
        zone::build_metrics(run_name, zone_name, counts, velocities),
        stats,
    ))
}

fn sorted_subdirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot read {}: {e}", root.display());
            return Ok(dirs);
        }
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
