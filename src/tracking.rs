// src/tracking.rs
//
// Frame-to-frame correspondence and velocity estimation. Per zone, the
// estimator is a two-state machine: Uninitialized (no previous frame seen)
// and Ready (previous classified frame cached). The first frame of a zone
// emits nothing; every later frame emits one velocity scalar per size
// class for the transition t-1 → t.

use crate::types::{ClassTriple, ClassifiedFrame, PairingPolicy, SizeClass};

pub struct VelocityEstimator {
    fps: f64,
    px_per_mm: f64,
    pairing: PairingPolicy,
    /// None = Uninitialized, Some = Ready. Held here explicitly so a zone's
    /// tracking pass is self-contained and composable; never ambient state.
    prev: Option<ClassifiedFrame>,
}

impl VelocityEstimator {
    pub fn new(fps: f64, px_per_mm: f64, pairing: PairingPolicy) -> Self {
        Self {
            fps,
            px_per_mm,
            pairing,
            prev: None,
        }
    }

    /// Advance the state machine by one frame. Returns the velocity triple
    /// (m/s, ordered Small/Medium/Large) for the transition from the
    /// previous frame, or None on the first frame of the zone.
    pub fn step(&mut self, frame: ClassifiedFrame) -> Option<ClassTriple> {
        let velocities = self.prev.as_ref().map(|prev| {
            let mut triple: ClassTriple = [0.0; 3];
            for (slot, class) in SizeClass::ALL.iter().enumerate() {
                triple[slot] =
                    self.class_velocity(prev.centroids(*class), frame.centroids(*class));
            }
            triple
        });
        self.prev = Some(frame);
        velocities
    }

    /// Mean velocity over all centroid pairs of one class. A class with
    /// zero centroids in either frame contributes no pairs and yields 0.0,
    /// never NaN.
    fn class_velocity(&self, prev: &[(f32, f32)], curr: &[(f32, f32)]) -> f64 {
        let pairs = match self.pairing {
            PairingPolicy::Positional => pair_positional(prev, curr),
            PairingPolicy::NearestNeighbor => pair_nearest(prev, curr),
        };
        if pairs.is_empty() {
            return 0.0;
        }

        let total: f64 = pairs
            .iter()
            .map(|&(a, b)| {
                let distance_px = displacement_px(a, b);
                let distance_mm = distance_px / self.px_per_mm;
                (distance_mm / 1000.0) * self.fps
            })
            .sum();
        total / pairs.len() as f64
    }
}

fn displacement_px(a: (f32, f32), b: (f32, f32)) -> f64 {
    let dx = (b.0 - a.0) as f64;
    let dy = (b.1 - a.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Baseline policy: i-th centroid pairs with i-th centroid over the
/// overlapping index range; surplus centroids on either side are ignored
/// for the transition.
fn pair_positional(
    prev: &[(f32, f32)],
    curr: &[(f32, f32)],
) -> Vec<((f32, f32), (f32, f32))> {
    prev.iter().copied().zip(curr.iter().copied()).collect()
}

/// Opt-in policy: greedy nearest-neighbor assignment, each current-frame
/// centroid consumed at most once.
fn pair_nearest(prev: &[(f32, f32)], curr: &[(f32, f32)]) -> Vec<((f32, f32), (f32, f32))> {
    let mut used = vec![false; curr.len()];
    let mut pairs = Vec::with_capacity(prev.len().min(curr.len()));

    for &p in prev {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &c) in curr.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let d = displacement_px(p, c);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((idx, d));
            }
        }
        if let Some((idx, _)) = best {
            used[idx] = true;
            pairs.push((p, curr[idx]));
        }
    }
    pairs
}
