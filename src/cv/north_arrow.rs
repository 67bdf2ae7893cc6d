//! North-arrow detection: four corner regions, two detection
//! methods per region, circular-mean combination, best-of-four selection.

use crate::model::cv::NorthArrowResult;
use crate::model::document::Confidence;

use super::detectors::{ContourDetector, LineDetector};
use super::geometry::{angular_distance, bearing_from_dxdy, circular_mean, corner_regions, is_axis_aligned, RasterDims};

/// Length bounds for line-method arrow candidates, in pixels. Not pinned
/// down numerically in the source spec beyond "filter to
/// MIN_ARROW_LENGTH..MAX_ARROW_LENGTH"; chosen to bracket a typical
/// arrowhead-plus-shaft glyph at common site-plan zoom levels.
const MIN_ARROW_LENGTH: f64 = 20.0;
const MAX_ARROW_LENGTH: f64 = 150.0;

const MEDIUM_LENGTH_THRESHOLD: f64 = 60.0;
const LOW_LENGTH_THRESHOLD: f64 = 30.0;

const AXIS_ALIGNED_TOLERANCE: f64 = 15.0;
const COMBINE_AGREEMENT_THRESHOLD: f64 = 20.0;

const CONTOUR_MIN_AREA: f64 = 100.0;
const CONTOUR_MAX_AREA: f64 = 10_000.0;
const CONTOUR_MIN_VERTICES: u32 = 3;
const CONTOUR_MAX_VERTICES: u32 = 5;

fn length_confidence(length: f64) -> Option<Confidence> {
    if length >= MEDIUM_LENGTH_THRESHOLD {
        Some(Confidence::Medium)
    } else if length >= LOW_LENGTH_THRESHOLD {
        Some(Confidence::Low)
    } else {
        None
    }
}

struct MethodResult {
    bearing: f64,
    confidence: Confidence,
}

fn line_method(page_path: &str, region: crate::cv::geometry::Rect, detector: &dyn LineDetector) -> Option<MethodResult> {
    let candidates: Vec<_> = detector
        .detect_lines(page_path, region)
        .into_iter()
        .filter(|seg| {
            let len = seg.length();
            len >= MIN_ARROW_LENGTH && len <= MAX_ARROW_LENGTH
        })
        .filter(|seg| !is_axis_aligned(seg.bearing(), AXIS_ALIGNED_TOLERANCE))
        .collect();

    let best = candidates
        .into_iter()
        .max_by(|a, b| a.length().partial_cmp(&b.length()).unwrap())?;

    let confidence = length_confidence(best.length())?;
    Some(MethodResult {
        bearing: best.bearing(),
        confidence,
    })
}

fn contour_method(page_path: &str, region: crate::cv::geometry::Rect, detector: &dyn ContourDetector) -> Option<MethodResult> {
    let best = detector
        .find_contours(page_path, region)
        .into_iter()
        .filter(|c| {
            c.bounding_area_px >= CONTOUR_MIN_AREA
                && c.bounding_area_px <= CONTOUR_MAX_AREA
                && c.vertex_count >= CONTOUR_MIN_VERTICES
                && c.vertex_count <= CONTOUR_MAX_VERTICES
        })
        .max_by(|a, b| a.bounding_area_px.partial_cmp(&b.bounding_area_px).unwrap())?;

    Some(MethodResult {
        bearing: bearing_from_dxdy(best.min_rect_dx, best.min_rect_dy),
        // The contour method alone never yields more than medium
        // confidence; only the line method can independently reach high,
        // and the combined result upgrades to high under the rule below.
        confidence: Confidence::Medium,
    })
}

fn detect_in_region(
    page_path: &str,
    region: crate::cv::geometry::Rect,
    lines: &dyn LineDetector,
    contours: &dyn ContourDetector,
) -> NorthArrowResult {
    let line = line_method(page_path, region, lines);
    let contour = contour_method(page_path, region, contours);

    match (line, contour) {
        (Some(l), Some(c)) => {
            if angular_distance(l.bearing, c.bearing) <= COMBINE_AGREEMENT_THRESHOLD {
                let bearing = circular_mean(&[l.bearing, c.bearing]);
                let confidence = if l.confidence.rank() >= Confidence::Medium.rank() {
                    Confidence::High
                } else {
                    Confidence::Medium
                };
                NorthArrowResult {
                    bearing: Some(bearing),
                    confidence: Some(confidence),
                }
            } else {
                // Disagreement between methods: the line method's reading
                // wins, matching its role as the primary signal.
                NorthArrowResult {
                    bearing: Some(l.bearing),
                    confidence: Some(l.confidence),
                }
            }
        }
        (Some(l), None) => NorthArrowResult {
            bearing: Some(l.bearing),
            confidence: Some(l.confidence),
        },
        (None, Some(c)) => NorthArrowResult {
            bearing: Some(c.bearing),
            confidence: Some(c.confidence),
        },
        (None, None) => NorthArrowResult::none(),
    }
}

/// Runs both detection methods in each of the four corner regions of a
/// page and returns the best result by confidence rank. Deterministic:
/// the same `(page_path, dims)` and detector outputs always produce the
/// same result.
pub fn detect_north_arrow(
    page_path: &str,
    dims: RasterDims,
    lines: &dyn LineDetector,
    contours: &dyn ContourDetector,
) -> NorthArrowResult {
    corner_regions(dims)
        .into_iter()
        .map(|region| detect_in_region(page_path, region, lines, contours))
        .max_by_key(|r| r.confidence_rank())
        .unwrap_or_else(NorthArrowResult::none)
}
