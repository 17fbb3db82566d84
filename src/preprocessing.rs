// src/preprocessing.rs
//
// Frame normalizer. Turns a raw zone frame into a binary foreground mask
// (255 = candidate bubble interior) through a fixed sequence:
//
//   grayscale → bilateral smoothing → CLAHE → adaptive threshold →
//   open/close → binarize-invert
//
// plus an optional second stage that canonicalizes surviving blobs into
// perfect filled circles of equal area, because downstream classification
// is radius-based and irregular blob outlines bias the fitted radius.

use anyhow::Result;
use opencv::{
    core::{self, Mat, Point, Scalar, Size, Vector},
    imgproc,
    prelude::*,
};

#[derive(Debug, Clone)]
pub struct NormalizerParams {
    pub bilateral_diameter: i32,
    pub bilateral_sigma: f64,
    pub clahe_clip_limit: f64,
    pub clahe_tile_size: i32,
    pub adaptive_block_size: i32,
    pub adaptive_offset: f64,
    /// Intensity below which a pixel counts as bubble interior after the
    /// carbon-black stage.
    pub foreground_cutoff: f64,
    /// Mid-gray band suppressed during refinement to kill anti-aliasing
    /// halos around blob edges.
    pub midgray_band: (u8, u8),
    /// Background holes smaller than this (px²) are filled.
    pub min_hole_area: i32,
    /// Foreground blobs smaller than this (px²) are removed.
    pub min_blob_area: i32,
    /// When true, run the second-stage refinement and emit canonical
    /// circle masks; when false, emit the raw binary mask.
    pub refine: bool,
}

impl Default for NormalizerParams {
    fn default() -> Self {
        Self {
            bilateral_diameter: 7,
            bilateral_sigma: 60.0,
            clahe_clip_limit: 2.5,
            clahe_tile_size: 8,
            adaptive_block_size: 15,
            adaptive_offset: 12.0,
            foreground_cutoff: 50.0,
            midgray_band: (85, 180),
            min_hole_area: 200,
            min_blob_area: 45,
            refine: true,
        }
    }
}

/// Steps 1-5: grayscale, edge-preserving smoothing, local contrast
/// equalization, local adaptive binarization, near-identity open/close.
/// Output keeps the carbon-black convention: bubbles dark on white.
fn carbon_black(frame: &Mat, params: &NormalizerParams) -> Result<Mat> {
    let mut gray = Mat::default();
    if frame.channels() == 3 {
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    } else {
        gray = frame.clone();
    }

    let mut smoothed = Mat::default();
    imgproc::bilateral_filter(
        &gray,
        &mut smoothed,
        params.bilateral_diameter,
        params.bilateral_sigma,
        params.bilateral_sigma,
        core::BORDER_DEFAULT,
    )?;

    let mut clahe = imgproc::create_clahe(
        params.clahe_clip_limit,
        Size::new(params.clahe_tile_size, params.clahe_tile_size),
    )?;
    let mut contrast = Mat::default();
    clahe.apply(&smoothed, &mut contrast)?;

    // Illumination is non-uniform across the frame, so each pixel is
    // thresholded against its Gaussian-weighted neighborhood mean.
    let mut binary = Mat::default();
    imgproc::adaptive_threshold(
        &contrast,
        &mut binary,
        255.0,
        imgproc::ADAPTIVE_THRESH_GAUSSIAN_C,
        imgproc::THRESH_BINARY,
        params.adaptive_block_size,
        params.adaptive_offset,
    )?;

    // 1x1 kernel: a no-op safeguard kept for fidelity with validated runs.
    let kernel = Mat::ones(1, 1, core::CV_8U)?.to_mat()?;
    let mut opened = Mat::default();
    imgproc::morphology_ex(
        &binary,
        &mut opened,
        imgproc::MORPH_OPEN,
        &kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    let mut closed = Mat::default();
    imgproc::morphology_ex(
        &opened,
        &mut closed,
        imgproc::MORPH_CLOSE,
        &kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;

    Ok(closed)
}

/// Normalize one frame into the foreground mask the passes consume,
/// refined or raw depending on `params.refine`.
pub fn normalize(frame: &Mat, params: &NormalizerParams) -> Result<Mat> {
    if params.refine {
        circle_mask(frame, params)
    } else {
        binary_mask(frame, params)
    }
}

/// Raw binary mask: steps 1-5 followed by a binarize-invert so bubble
/// interiors come out as 255 on a zero background.
pub fn binary_mask(frame: &Mat, params: &NormalizerParams) -> Result<Mat> {
    if frame.empty() {
        return Ok(Mat::default());
    }
    let cb = carbon_black(frame, params)?;
    let mut mask = Mat::default();
    imgproc::threshold(
        &cb,
        &mut mask,
        params.foreground_cutoff,
        255.0,
        imgproc::THRESH_BINARY_INV,
    )?;
    Ok(mask)
}

/// Canonical circle mask: full refinement pipeline. Each surviving blob is
/// re-drawn as a filled circle of identical area at its centroid.
pub fn circle_mask(frame: &Mat, params: &NormalizerParams) -> Result<Mat> {
    if frame.empty() {
        return Ok(Mat::default());
    }
    let cb = carbon_black(frame, params)?;

    let mut blurred = Mat::default();
    imgproc::gaussian_blur(
        &cb,
        &mut blurred,
        Size::new(5, 5),
        0.0,
        0.0,
        core::BORDER_DEFAULT,
    )?;

    let sharpen_kernel = Mat::from_slice_2d(&[
        [-1.0f32, -1.0, -1.0],
        [-1.0, 9.0, -1.0],
        [-1.0, -1.0, -1.0],
    ])?;
    let mut sharpened = Mat::default();
    imgproc::filter_2d(
        &blurred,
        &mut sharpened,
        -1,
        &sharpen_kernel,
        Point::new(-1, -1),
        0.0,
        core::BORDER_DEFAULT,
    )?;

    // Anti-aliasing halos land in the mid-gray band; push them to the
    // white background so only solid-dark pixels survive as foreground.
    let (lo, hi) = params.midgray_band;
    let mut midgray = Mat::default();
    core::in_range(
        &sharpened,
        &Scalar::all(lo as f64),
        &Scalar::all(hi as f64),
        &mut midgray,
    )?;
    sharpened.set_to(&Scalar::all(255.0), &midgray)?;

    let mut foreground = Mat::default();
    imgproc::threshold(
        &sharpened,
        &mut foreground,
        (lo - 1) as f64,
        255.0,
        imgproc::THRESH_BINARY_INV,
    )?;

    let filled = fill_small_holes(&foreground, params.min_hole_area)?;
    let filtered = remove_small_blobs(&filled, params.min_blob_area)?;
    canonicalize_circles(&filtered)
}

/// Background components (4-connected) smaller than `max_area` become
/// foreground. The outer background is one large component and survives.
fn fill_small_holes(mask: &Mat, max_area: i32) -> Result<Mat> {
    let mut inverted = Mat::default();
    core::bitwise_not(mask, &mut inverted, &core::no_array())?;

    let mut labels = Mat::default();
    let mut stats = Mat::default();
    let mut centroids = Mat::default();
    let count = imgproc::connected_components_with_stats(
        &inverted,
        &mut labels,
        &mut stats,
        &mut centroids,
        4,
        core::CV_32S,
    )?;

    let mut fill = vec![false; count as usize];
    for label in 1..count {
        let area = *stats.at_2d::<i32>(label, imgproc::CC_STAT_AREA)?;
        if area < max_area {
            fill[label as usize] = true;
        }
    }

    let mut out = mask.try_clone()?;
    for row in 0..out.rows() {
        for col in 0..out.cols() {
            let label = *labels.at_2d::<i32>(row, col)?;
            if fill[label as usize] {
                *out.at_2d_mut::<u8>(row, col)? = 255;
            }
        }
    }
    Ok(out)
}

/// Foreground components (8-connected) smaller than `min_area` are erased.
fn remove_small_blobs(mask: &Mat, min_area: i32) -> Result<Mat> {
    let mut labels = Mat::default();
    let mut stats = Mat::default();
    let mut centroids = Mat::default();
    let count = imgproc::connected_components_with_stats(
        mask,
        &mut labels,
        &mut stats,
        &mut centroids,
        8,
        core::CV_32S,
    )?;

    let mut keep = vec![false; count as usize];
    for label in 1..count {
        let area = *stats.at_2d::<i32>(label, imgproc::CC_STAT_AREA)?;
        keep[label as usize] = area >= min_area;
    }

    let mut out = Mat::zeros(mask.rows(), mask.cols(), core::CV_8UC1)?.to_mat()?;
    for row in 0..out.rows() {
        for col in 0..out.cols() {
            let label = *labels.at_2d::<i32>(row, col)?;
            if keep[label as usize] {
                *out.at_2d_mut::<u8>(row, col)? = 255;
            }
        }
    }
    Ok(out)
}

/// Re-draw each blob as a filled circle of equal area, centered on its
/// moment centroid (bounding-box center when the moment degenerates).
fn canonicalize_circles(mask: &Mat) -> Result<Mat> {
    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(
        mask,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut canvas = Mat::zeros(mask.rows(), mask.cols(), core::CV_8UC1)?.to_mat()?;
    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        if area <= 0.0 {
            continue;
        }
        let radius = (area / std::f64::consts::PI).sqrt() as i32;

        let m = imgproc::moments(&contour, false)?;
        let (cx, cy) = if m.m00 != 0.0 {
            ((m.m10 / m.m00) as i32, (m.m01 / m.m00) as i32)
        } else {
            let rect = imgproc::bounding_rect(&contour)?;
            (rect.x + rect.width / 2, rect.y + rect.height / 2)
        };

        imgproc::circle(
            &mut canvas,
            Point::new(cx, cy),
            radius.max(1),
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_frame(rows: i32, cols: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, Scalar::all(255.0)).unwrap()
    }

    fn frame_with_disk(rows: i32, cols: i32, cx: i32, cy: i32, radius: i32) -> Mat {
        let mut frame = white_frame(rows, cols);
        imgproc::circle(
            &mut frame,
            Point::new(cx, cy),
            radius,
            Scalar::all(0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        frame
    }

    #[test]
    fn empty_input_yields_empty_mask() {
        let params = NormalizerParams::default();
        let mask = binary_mask(&Mat::default(), &params).unwrap();
        assert!(mask.empty());
        let mask = circle_mask(&Mat::default(), &params).unwrap();
        assert!(mask.empty());
    }

    #[test]
    fn uniform_frame_has_no_foreground() {
        let params = NormalizerParams::default();
        let mask = binary_mask(&white_frame(64, 64), &params).unwrap();
        assert_eq!(mask.rows(), 64);
        assert_eq!(mask.cols(), 64);
        assert_eq!(core::count_non_zero(&mask).unwrap(), 0);
    }

    #[test]
    fn dark_disk_survives_as_foreground() {
        let params = NormalizerParams::default();
        let frame = frame_with_disk(160, 160, 80, 80, 5);
        let mask = binary_mask(&frame, &params).unwrap();
        assert!(core::count_non_zero(&mask).unwrap() > 0);
        // foreground stays local to the disk
        assert_eq!(*mask.at_2d::<u8>(10, 10).unwrap(), 0);
    }

    #[test]
    fn refinement_drops_blobs_below_min_area() {
        let params = NormalizerParams::default();
        // radius 2 disk is ~13 px², well under the 45 px² floor
        let frame = frame_with_disk(160, 160, 80, 80, 2);
        let mask = circle_mask(&frame, &params).unwrap();
        assert_eq!(core::count_non_zero(&mask).unwrap(), 0);
    }

    #[test]
    fn refinement_canonicalizes_surviving_blob() {
        let params = NormalizerParams::default();
        let frame = frame_with_disk(160, 160, 80, 80, 6);
        let mask = circle_mask(&frame, &params).unwrap();
        let area = core::count_non_zero(&mask).unwrap();
        assert!(area > 0, "disk of radius 6 should survive refinement");
        // re-drawn circle stays near the original footprint
        assert!(area < 4 * 113, "canonical circle grew too much: {area} px");
    }

    #[test]
    fn fill_small_holes_preserves_outer_background() {
        let mut mask = Mat::zeros(64, 64, core::CV_8UC1).unwrap().to_mat().unwrap();
        // ring with a 3x3 hole in the middle
        imgproc::circle(
            &mut mask,
            Point::new(32, 32),
            10,
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        for row in 31..34 {
            for col in 31..34 {
                *mask.at_2d_mut::<u8>(row, col).unwrap() = 0;
            }
        }
        let filled = fill_small_holes(&mask, 200).unwrap();
        assert_eq!(*filled.at_2d::<u8>(32, 32).unwrap(), 255);
        assert_eq!(*filled.at_2d::<u8>(2, 2).unwrap(), 0);
    }

    #[test]
    fn remove_small_blobs_keeps_large_ones() {
        let mut mask = Mat::zeros(64, 64, core::CV_8UC1).unwrap().to_mat().unwrap();
        imgproc::circle(
            &mut mask,
            Point::new(16, 16),
            6,
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        *mask.at_2d_mut::<u8>(50, 50).unwrap() = 255;

        let filtered = remove_small_blobs(&mask, 45).unwrap();
        assert_eq!(*filtered.at_2d::<u8>(16, 16).unwrap(), 255);
        assert_eq!(*filtered.at_2d::<u8>(50, 50).unwrap(), 0);
    }
}
