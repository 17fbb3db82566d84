// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    #[serde(default)]
    pub preprocessing: PreprocessConfig,
    pub classes: ClassConfig,
    pub tracking: TrackingConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// When true (the default), the normalizer runs the full refinement
    /// stage and emits canonical circle masks; when false it emits the
    /// raw binary mask straight after adaptive thresholding.
    #[serde(default = "default_refine")]
    pub refine: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self { refine: true }
    }
}

fn default_refine() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Camera frame rate of the source footage, frames per second.
    pub fps: f64,
    /// Pixel-to-physical calibration of the cropped zone images.
    pub px_per_mm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassConfig {
    /// Radius thresholds (px) used by the counting pass: Small < t1,
    /// Medium < t2, Large < t3, dropped at >= t3.
    pub counting: [f32; 3],
    /// Radius thresholds (px) used by the tracking pass. Intentionally
    /// different from the counting set; both belong to the validated
    /// experiment record and must never be unified.
    pub tracking: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub pairing: PairingPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory holding one folder per run, each containing one
    /// folder per zone of already-cropped still frames.
    pub input_dir: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// How centroids of consecutive frames are paired per size class.
///
/// `Positional` is the validated baseline: the i-th centroid of frame t-1
/// pairs with the i-th centroid of frame t. It mispairs bubbles whenever
/// contour extraction order changes between frames. `NearestNeighbor` is
/// the opt-in alternative; the numbers in existing experiment data were
/// produced with `Positional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    Positional,
    NearestNeighbor,
}

/// A detected bubble: minimal enclosing circle of an accepted contour.
/// Only circles that passed the circularity filter exist as this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];
}

/// Per-frame bubble centroids bucketed by size class, extraction order
/// preserved within each class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedFrame {
    pub small: Vec<(f32, f32)>,
    pub medium: Vec<(f32, f32)>,
    pub large: Vec<(f32, f32)>,
}

impl ClassifiedFrame {
    pub fn centroids(&self, class: SizeClass) -> &[(f32, f32)] {
        match class {
            SizeClass::Small => &self.small,
            SizeClass::Medium => &self.medium,
            SizeClass::Large => &self.large,
        }
    }

    pub fn counts(&self) -> [usize; 3] {
        [self.small.len(), self.medium.len(), self.large.len()]
    }
}

/// One scalar per size class, ordered Small, Medium, Large.
pub type ClassTriple = [f64; 3];

/// The unit of persistence: one row per (run, zone) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMetrics {
    pub run_name: String,
    pub zone_name: String,
    pub avg_small_count: f64,
    pub avg_medium_count: f64,
    pub avg_large_count: f64,
    pub avg_small_velocity: f64,
    pub avg_medium_velocity: f64,
    pub avg_large_velocity: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("could not decode frame {path}")]
    Decode { path: String },
}
