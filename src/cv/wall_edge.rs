//! Wall-edge measurement: single-region line detection with a
//! higher minimum length, producing candidates for the rotation estimator.

use crate::model::cv::{GridPosition, WallEdgeCandidate};

use super::detectors::LineDetector;
use super::geometry::{LineSegment, Rect};

const MIN_WALL_EDGE_LENGTH: f64 = 100.0;
const TOP_N: usize = 8;

fn grid_position(midpoint_x: f64, midpoint_y: f64, region: Rect) -> GridPosition {
    let col = (((midpoint_x - region.x) / region.width) * 3.0).floor().clamp(0.0, 2.0) as u32;
    let row = (((midpoint_y - region.y) / region.height) * 3.0).floor().clamp(0.0, 2.0) as u32;
    match (row, col) {
        (0, 0) => GridPosition::TopLeft,
        (0, 1) => GridPosition::TopCenter,
        (0, 2) => GridPosition::TopRight,
        (1, 0) => GridPosition::MiddleLeft,
        (1, 1) => GridPosition::Center,
        (1, 2) => GridPosition::MiddleRight,
        (2, 0) => GridPosition::BottomLeft,
        (2, 1) => GridPosition::BottomCenter,
        _ => GridPosition::BottomRight,
    }
}

fn to_candidate(seg: LineSegment, region: Rect) -> WallEdgeCandidate {
    let angle = seg.angle_from_horizontal();
    let midpoint_x = (seg.x1 + seg.x2) / 2.0;
    let midpoint_y = (seg.y1 + seg.y2) / 2.0;
    WallEdgeCandidate {
        angle_from_horizontal: angle,
        length_px: seg.length(),
        grid_position: grid_position(midpoint_x, midpoint_y, region),
        outward_normal_bearing: (angle + 90.0).rem_euclid(360.0),
    }
}

/// Detects wall-edge candidates over the whole page region, keeping the
/// top 8 by length.
pub fn detect_wall_edges(page_path: &str, region: Rect, detector: &dyn LineDetector) -> Vec<WallEdgeCandidate> {
    let mut candidates: Vec<WallEdgeCandidate> = detector
        .detect_lines(page_path, region)
        .into_iter()
        .filter(|seg| seg.length() >= MIN_WALL_EDGE_LENGTH)
        .map(|seg| to_candidate(seg, region))
        .collect();

    candidates.sort_by(|a, b| b.length_px.partial_cmp(&a.length_px).unwrap());
    candidates.truncate(TOP_N);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLines(Vec<LineSegment>);
    impl LineDetector for FixedLines {
        fn detect_lines(&self, _page_path: &str, _region: Rect) -> Vec<LineSegment> {
            self.0.clone()
        }
    }

    fn full_page() -> Rect {
        Rect { x: 0.0, y: 0.0, width: 900.0, height: 900.0 }
    }

    #[test]
    fn test_short_segments_filtered_out() {
        let lines = FixedLines(vec![LineSegment { x1: 0.0, y1: 0.0, x2: 50.0, y2: 0.0 }]);
        let candidates = detect_wall_edges("page.png", full_page(), &lines);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_top_n_by_length() {
        let lines = FixedLines(
            (1..=10)
                .map(|i| LineSegment { x1: 0.0, y1: 0.0, x2: 100.0 + i as f64 * 10.0, y2: 0.0 })
                .collect(),
        );
        let candidates = detect_wall_edges("page.png", full_page(), &lines);
        assert_eq!(candidates.len(), 8);
        // Sorted descending by length.
        assert!(candidates[0].length_px >= candidates[1].length_px);
    }

    #[test]
    fn test_outward_normal_is_perpendicular() {
        let lines = FixedLines(vec![LineSegment { x1: 0.0, y1: 0.0, x2: 200.0, y2: 0.0 }]);
        let candidates = detect_wall_edges("page.png", full_page(), &lines);
        assert_eq!(candidates[0].angle_from_horizontal, 0.0);
        assert_eq!(candidates[0].outward_normal_bearing, 90.0);
    }

    #[test]
    fn test_grid_position_center() {
        let lines = FixedLines(vec![LineSegment { x1: 400.0, y1: 450.0, x2: 500.0, y2: 450.0 }]);
        let candidates = detect_wall_edges("page.png", full_page(), &lines);
        assert_eq!(candidates[0].grid_position, GridPosition::Center);
    }
}
