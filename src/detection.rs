// src/detection.rs
//
// Circle extractor: connected foreground contours → minimal enclosing
// circles, gated by the circularity filter. Elongated, irregular and
// merged/touching blobs fail the filter and never become a Circle.

use crate::types::Circle;
use anyhow::Result;
use opencv::{
    core::{Point, Point2f, Vector},
    imgproc,
    prelude::*,
};

/// Accept a contour only if its measured area is within this band of the
/// enclosing circle's area.
const CIRCULARITY_LOW: f64 = 0.7;
const CIRCULARITY_HIGH: f64 = 1.3;

/// Contours with fewer boundary points cannot be fitted robustly.
const MIN_CONTOUR_POINTS: usize = 5;

/// Extract bubble circles from a foreground mask (255 = bubble interior).
/// Output order follows contour extraction order; callers must not assume
/// any spatial ordering beyond that.
pub fn extract_circles(mask: &Mat) -> Result<Vec<Circle>> {
    if mask.empty() {
        return Ok(Vec::new());
    }

    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(
        mask,
        &mut contours,
        imgproc::RETR_TREE,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut circles = Vec::new();
    for contour in contours.iter() {
        if contour.len() < MIN_CONTOUR_POINTS {
            continue;
        }

        let mut center = Point2f::new(0.0, 0.0);
        let mut radius = 0.0f32;
        imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;

        let area = imgproc::contour_area(&contour, false)?;
        let circle_area = std::f64::consts::PI * (radius as f64) * (radius as f64);

        if CIRCULARITY_LOW * circle_area < area && area < CIRCULARITY_HIGH * circle_area {
            circles.push(Circle {
                x: center.x,
                y: center.y,
                radius,
            });
        }
    }
    Ok(circles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{self, Scalar};

    fn blank(rows: i32, cols: i32) -> Mat {
        Mat::zeros(rows, cols, core::CV_8UC1).unwrap().to_mat().unwrap()
    }

    fn draw_disk(mask: &mut Mat, cx: i32, cy: i32, radius: i32) {
        imgproc::circle(
            mask,
            Point::new(cx, cy),
            radius,
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
    }

    #[test]
    fn empty_mask_yields_no_circles() {
        assert!(extract_circles(&Mat::default()).unwrap().is_empty());
        assert!(extract_circles(&blank(32, 32)).unwrap().is_empty());
    }

    #[test]
    fn filled_disk_is_accepted() {
        let mut mask = blank(100, 100);
        draw_disk(&mut mask, 50, 50, 10);

        let circles = extract_circles(&mask).unwrap();
        assert_eq!(circles.len(), 1);
        let c = &circles[0];
        assert!((c.x - 50.0).abs() < 2.0, "center x off: {}", c.x);
        assert!((c.y - 50.0).abs() < 2.0, "center y off: {}", c.y);
        assert!((c.radius - 10.0).abs() < 2.0, "radius off: {}", c.radius);
    }

    #[test]
    fn elongated_blob_fails_circularity() {
        let mut mask = blank(100, 100);
        imgproc::rectangle(
            &mut mask,
            core::Rect::new(20, 45, 60, 8),
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();

        assert!(extract_circles(&mask).unwrap().is_empty());
    }

    #[test]
    fn every_extracted_circle_satisfies_circularity() {
        let mut mask = blank(200, 200);
        draw_disk(&mut mask, 40, 40, 6);
        draw_disk(&mut mask, 120, 60, 12);
        imgproc::rectangle(
            &mut mask,
            core::Rect::new(10, 150, 80, 10),
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();

        let circles = extract_circles(&mask).unwrap();
        assert_eq!(circles.len(), 2, "rectangle must be rejected");
        // the invariant is enforced at creation, so re-measuring each
        // accepted disk against an ideal filled circle stays in band
        for c in &circles {
            let ideal = std::f64::consts::PI * (c.radius as f64).powi(2);
            let mut probe = blank(200, 200);
            draw_disk(&mut probe, c.x as i32, c.y as i32, c.radius as i32);
            let measured = core::count_non_zero(&probe).unwrap() as f64;
            assert!(measured > 0.6 * ideal && measured < 1.4 * ideal);
        }
    }
}
