// src/classification.rs
//
// Radius-based size classification. Two threshold policies coexist on
// purpose: the counting pass and the tracking pass were validated against
// different band sets, and unifying them would silently change every
// reported statistic.

use crate::types::{Circle, ClassifiedFrame, SizeClass};

#[derive(Debug, Clone, Copy)]
pub struct ClassPolicy {
    pub t1: f32,
    pub t2: f32,
    pub t3: f32,
}

impl ClassPolicy {
    pub fn from_thresholds(t: [f32; 3]) -> Self {
        Self {
            t1: t[0],
            t2: t[1],
            t3: t[2],
        }
    }

    /// Exhaustive and disjoint below t3; radii at or above t3 fall outside
    /// every band and are dropped (a documented drop, not an error).
    pub fn classify(&self, radius: f32) -> Option<SizeClass> {
        if radius < self.t1 {
            Some(SizeClass::Small)
        } else if radius < self.t2 {
            Some(SizeClass::Medium)
        } else if radius < self.t3 {
            Some(SizeClass::Large)
        } else {
            None
        }
    }

    /// Bucket circle centroids by class, preserving input order.
    pub fn classify_frame(&self, circles: &[Circle]) -> ClassifiedFrame {
        let mut frame = ClassifiedFrame::default();
        for circle in circles {
            let centroid = (circle.x, circle.y);
            match self.classify(circle.radius) {
                Some(SizeClass::Small) => frame.small.push(centroid),
                Some(SizeClass::Medium) => frame.medium.push(centroid),
                Some(SizeClass::Large) => frame.large.push(centroid),
                None => {}
            }
        }
        frame
    }
}
