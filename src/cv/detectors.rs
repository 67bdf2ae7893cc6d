//! Traits for the image-processing primitives CV sensors consume.
//!
//! Spec §1 excludes edge/line/contour detection implementation from this
//! core's scope: "their *use* is specified, their implementation is not."
//! Mirrors the `AgentExecutor` pattern from `agent`: sensors depend only
//! on these traits, never on a concrete vision backend, so a test double
//! can drive deterministic unit tests without real image processing.

use super::geometry::{LineSegment, Rect};

/// A closed contour's bounding box area and polygon-approximation vertex
/// count, as used by the north-arrow contour method. The
/// minimum-area rectangle's orientation is reported as a pixel-space
/// direction vector, not a bearing — bearing conversion (negating dy) is
/// this crate's responsibility, not the detector's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contour {
    pub bounding_area_px: f64,
    pub vertex_count: u32,
    pub min_rect_dx: f64,
    pub min_rect_dy: f64,
}

/// Line-segment extraction over a region of a raster page.
pub trait LineDetector: Send + Sync {
    fn detect_lines(&self, page_path: &str, region: Rect) -> Vec<LineSegment>;
}

/// Closed-contour extraction over a region of a raster page.
pub trait ContourDetector: Send + Sync {
    fn find_contours(&self, page_path: &str, region: Rect) -> Vec<Contour>;
}
