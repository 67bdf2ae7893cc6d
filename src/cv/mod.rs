//! Deterministic computer-vision sensors over a single rendered page.
//! North-arrow bearing, wall-edge candidates, and building rotation, all
//! pure functions of the page raster plus the external detector
//! primitives in `detectors`.

pub mod detectors;
pub mod geometry;
pub mod north_arrow;
pub mod rotation;
pub mod wall_edge;

use crate::model::cv::CvHints;
use detectors::{ContourDetector, LineDetector};
use geometry::{Rect, RasterDims};

/// Renders a site-plan page through both sensors and fuses the result
/// into a single `CvHints` block.
pub fn compute_cv_hints(
    page_path: &str,
    dims: RasterDims,
    lines: &dyn LineDetector,
    contours: &dyn ContourDetector,
) -> CvHints {
    let full_page = Rect {
        x: 0.0,
        y: 0.0,
        width: dims.width as f64,
        height: dims.height as f64,
    };
    let north_arrow = north_arrow::detect_north_arrow(page_path, dims, lines, contours);
    let wall_edges = wall_edge::detect_wall_edges(page_path, full_page, lines);
    let rotation = rotation::estimate_rotation(&wall_edges);

    CvHints {
        north_arrow,
        wall_edges,
        rotation,
    }
}
