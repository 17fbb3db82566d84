// src/zone.rs
//
// Per-zone passes and aggregation. Counting and tracking are two
// independent pure passes over the same immutable frame sequence, each
// with its own classifier policy; the caller joins their results into one
// ZoneMetrics record before persisting.

use crate::classification::ClassPolicy;
use crate::detection::extract_circles;
use crate::frame_source::FrameSource;
use crate::preprocessing::{normalize, NormalizerParams};
use crate::tracking::VelocityEstimator;
use crate::types::{ClassTriple, PairingPolicy, ZoneMetrics};
use anyhow::Result;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct PassStats {
    pub frames: usize,
    pub skipped: usize,
}

/// Counting pass: mean per-frame circle count per size class. A zone with
/// zero readable frames aggregates to zeros, not an error.
pub fn count_pass(
    zone_dir: &Path,
    policy: ClassPolicy,
    params: &NormalizerParams,
) -> Result<(ClassTriple, PassStats)> {
    let mut source = FrameSource::open(zone_dir)?;
    let mut per_frame: Vec<[usize; 3]> = Vec::new();

    while let Some(frame) = source.next_frame() {
        let mask = normalize(&frame, params)?;
        let circles = extract_circles(&mask)?;
        let classified = policy.classify_frame(&circles);
        per_frame.push(classified.counts());
    }

    debug!(
        "count pass over {}: {} candidates, {} frames, {} skipped",
        zone_dir.display(),
        source.len(),
        per_frame.len(),
        source.skipped()
    );

    let stats = PassStats {
        frames: per_frame.len(),
        skipped: source.skipped(),
    };
    Ok((mean_counts(&per_frame), stats))
}

/// Tracking pass: mean per-transition velocity per size class. Transitions
/// are strictly sequential frame pairs; a zone with fewer than two
/// readable frames aggregates to zeros.
pub fn track_pass(
    zone_dir: &Path,
    policy: ClassPolicy,
    params: &NormalizerParams,
    fps: f64,
    px_per_mm: f64,
    pairing: PairingPolicy,
) -> Result<(ClassTriple, PassStats)> {
    let mut source = FrameSource::open(zone_dir)?;
    if source.is_empty() {
        return Ok(([0.0; 3], PassStats::default()));
    }

    let mut estimator = VelocityEstimator::new(fps, px_per_mm, pairing);
    let mut transitions: Vec<ClassTriple> = Vec::new();
    let mut frames = 0usize;

    while let Some(frame) = source.next_frame() {
        frames += 1;
        let mask = normalize(&frame, params)?;
        let circles = extract_circles(&mask)?;
        let classified = policy.classify_frame(&circles);
        if let Some(triple) = estimator.step(classified) {
            transitions.push(triple);
        }
    }

    debug!(
        "track pass over {}: {} frames, {} transitions, {} skipped",
        zone_dir.display(),
        frames,
        transitions.len(),
        source.skipped()
    );

    let stats = PassStats {
        frames,
        skipped: source.skipped(),
    };
    Ok((mean_velocities(&transitions), stats))
}

pub fn build_metrics(
    run_name: &str,
    zone_name: &str,
    counts: ClassTriple,
    velocities: ClassTriple,
) -> ZoneMetrics {
    ZoneMetrics {
        run_name: run_name.to_string(),
        zone_name: zone_name.to_string(),
        avg_small_count: counts[0],
        avg_medium_count: counts[1],
        avg_large_count: counts[2],
        avg_small_velocity: velocities[0],
        avg_medium_velocity: velocities[1],
        avg_large_velocity: velocities[2],
    }
}

fn mean_counts(per_frame: &[[usize; 3]]) -> ClassTriple {
    if per_frame.is_empty() {
        return [0.0; 3];
    }
    let mut sums = [0.0f64; 3];
    for counts in per_frame {
        for slot in 0..3 {
            sums[slot] += counts[slot] as f64;
        }
    }
    sums.map(|s| s / per_frame.len() as f64)
}

fn mean_velocities(transitions: &[ClassTriple]) -> ClassTriple {
    if transitions.is_empty() {
        return [0.0; 3];
    }
    let mut sums = [0.0f64; 3];
    for triple in transitions {
        for slot in 0..3 {
            sums[slot] += triple[slot];
        }
    }
    sums.map(|s| s / transitions.len() as f64)
}
