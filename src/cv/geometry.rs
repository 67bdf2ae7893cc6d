//! Pure geometric primitives shared by the CV sensors: circular statistics,
//! pixel-to-bearing conversion, and the corner-region layout used by
//! north-arrow detection.
//!
//! None of this module touches pixels — the image-processing primitives
//! (edge detection, line detection, contour finding) are external
//! collaborators behind the traits in `cv::detectors`; this module is the
//! deterministic math that consumes their output.

/// Raster dimensions of a rendered page. The actual pixel buffer is owned
/// by the external rasterizer; sensors only need width/height to compute
/// regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterDims {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A detected line segment in pixel space. Image y grows downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        ((self.x2 - self.x1).powi(2) + (self.y2 - self.y1).powi(2)).sqrt()
    }

    /// Compass bearing of this segment's direction,:
    /// `(90 - atan2(-dy, dx) * 180/pi) mod 360`, negating dy because the
    /// image y-axis grows downward.
    pub fn bearing(&self) -> f64 {
        bearing_from_dxdy(self.x2 - self.x1, self.y2 - self.y1)
    }

    /// Angle from horizontal in [0, 180), used by wall-edge measurement —
    /// undirected, unlike `bearing()`.
    pub fn angle_from_horizontal(&self) -> f64 {
        let dx = self.x2 - self.x1;
        let dy = self.y2 - self.y1;
        let mut angle = dy.atan2(dx).to_degrees();
        angle = angle.rem_euclid(180.0);
        angle
    }
}

/// Compass bearing from a pixel-space displacement. Negates `dy` because
/// the image y-axis grows downward.
pub fn bearing_from_dxdy(dx: f64, dy: f64) -> f64 {
    let math_deg = (-dy).atan2(dx).to_degrees();
    (90.0 - math_deg).rem_euclid(360.0)
}

/// Circular mean of a set of compass bearings: `atan2(mean_sin, mean_cos)`.
/// Linear averaging is wrong near the 0/360 wraparound; this is the form used everywhere angles are combined.
pub fn circular_mean(bearings: &[f64]) -> f64 {
    if bearings.is_empty() {
        return 0.0;
    }
    let (sum_sin, sum_cos) = bearings.iter().fold((0.0, 0.0), |(s, c), &b| {
        let rad = b.to_radians();
        (s + rad.sin(), c + rad.cos())
    });
    let mean_sin = sum_sin / bearings.len() as f64;
    let mean_cos = sum_cos / bearings.len() as f64;
    mean_sin.atan2(mean_cos).to_degrees().rem_euclid(360.0)
}

/// Minimal angular distance between two compass bearings, in [0, 180].
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

/// Wraparound distance over [0, 180) used for wall-edge angle clustering
/// (k-means over undirected line angles, where a line and its 180°-opposite
/// are the same direction).
pub fn angle_180_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(180.0);
    diff.min(180.0 - diff)
}

/// Whether a bearing is within `tolerance` degrees of any cardinal
/// direction (0/90/180/270), used to filter axis-aligned grid/dimension
/// lines out of north-arrow candidates.
pub fn is_axis_aligned(bearing: f64, tolerance: f64) -> bool {
    [0.0, 90.0, 180.0, 270.0]
        .iter()
        .any(|&cardinal| angular_distance(bearing, cardinal) <= tolerance)
}

/// The four 25%-width x 25%-height corner regions a site-plan page is
/// divided into for north-arrow detection — arrows appear in margins, not
/// at page centers.
pub fn corner_regions(dims: RasterDims) -> [Rect; 4] {
    let w = dims.width as f64 * 0.25;
    let h = dims.height as f64 * 0.25;
    let right_x = dims.width as f64 - w;
    let bottom_y = dims.height as f64 - h;
    [
        Rect { x: 0.0, y: 0.0, width: w, height: h },
        Rect { x: right_x, y: 0.0, width: w, height: h },
        Rect { x: 0.0, y: bottom_y, width: w, height: h },
        Rect { x: right_x, y: bottom_y, width: w, height: h },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_mean_wraparound() {
        let mean = circular_mean(&[355.0, 5.0]);
        assert!((mean - 0.0).abs() < 0.1 || (mean - 360.0).abs() < 0.1);
    }

    #[test]
    fn test_circular_mean_single_value_is_identity() {
        for theta in [0.0, 45.0, 90.0, 180.0, 270.0, 359.9] {
            let mean = circular_mean(&[theta]);
            assert!(angular_distance(mean, theta) < 1e-6);
        }
    }

    #[test]
    fn test_angular_distance_symmetric() {
        assert_eq!(angular_distance(10.0, 350.0), angular_distance(350.0, 10.0));
        assert!((angular_distance(10.0, 350.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_angular_distance_bounded() {
        for (a, b) in [(0.0, 180.0), (359.0, 1.0), (90.0, 270.0)] {
            let d = angular_distance(a, b);
            assert!((0.0..=180.0).contains(&d));
        }
    }

    #[test]
    fn test_bearing_from_dxdy_north_is_zero() {
        // Straight up in pixel space: dx = 0, dy negative (upward, since y grows down).
        let bearing = bearing_from_dxdy(0.0, -10.0);
        assert!(angular_distance(bearing, 0.0) < 1e-9);
    }

    #[test]
    fn test_bearing_from_dxdy_east_is_90() {
        let bearing = bearing_from_dxdy(10.0, 0.0);
        assert!(angular_distance(bearing, 90.0) < 1e-9);
    }

    #[test]
    fn test_is_axis_aligned() {
        assert!(is_axis_aligned(3.0, 15.0));
        assert!(is_axis_aligned(358.0, 15.0));
        assert!(!is_axis_aligned(45.0, 15.0));
    }

    #[test]
    fn test_corner_regions_cover_margins() {
        let regions = corner_regions(RasterDims { width: 1000, height: 800 });
        assert_eq!(regions[0].x, 0.0);
        assert_eq!(regions[0].y, 0.0);
        assert_eq!(regions[1].x, 750.0);
        assert_eq!(regions[3].y, 600.0);
    }
}
