//! Deterministic computer-vision hints produced from a single site-plan
//! page: north-arrow bearing, wall-edge candidates, and a building-rotation
//! estimate.

use super::document::Confidence;
use serde::{Deserialize, Serialize};

/// North-arrow bearing in compass degrees, or none if no region produced a
/// detection. `Option<Confidence>` models the `{high, medium, low, none}`
/// confidence set — `None` here is "none".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NorthArrowResult {
    pub bearing: Option<f64>,
    pub confidence: Option<Confidence>,
}

impl NorthArrowResult {
    pub fn none() -> Self {
        NorthArrowResult {
            bearing: None,
            confidence: None,
        }
    }

    pub fn confidence_rank(&self) -> u8 {
        self.confidence.map(|c| c.rank()).unwrap_or(0)
    }
}

/// A 3x3 grid position label used to locate a wall-edge candidate within
/// the page raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridPosition {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// One detected wall edge: angle-from-horizontal in [0,180), pixel length,
/// a coarse grid position, and the outward-normal compass bearing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallEdgeCandidate {
    pub angle_from_horizontal: f64,
    pub length_px: f64,
    pub grid_position: GridPosition,
    pub outward_normal_bearing: f64,
}

/// Building-rotation estimate from k-means clustering of wall-edge angles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationEstimate {
    pub rotation_degrees: f64,
    pub confidence: Confidence,
}

/// Combined CV output from a single raster page. Determinism invariant:
/// the same input page must produce bit-identical output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvHints {
    pub north_arrow: NorthArrowResult,
    /// Top 8 by length,
    pub wall_edges: Vec<WallEdgeCandidate>,
    pub rotation: Option<RotationEstimate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_arrow_none_has_zero_rank() {
        assert_eq!(NorthArrowResult::none().confidence_rank(), 0);
    }

    #[test]
    fn test_north_arrow_high_outranks_low() {
        let high = NorthArrowResult {
            bearing: Some(10.0),
            confidence: Some(Confidence::High),
        };
        let low = NorthArrowResult {
            bearing: Some(20.0),
            confidence: Some(Confidence::Low),
        };
        assert!(high.confidence_rank() > low.confidence_rank());
    }
}
