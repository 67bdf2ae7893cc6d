//! Building-rotation estimate: fixed-iteration k-means (k=2)
//! over wall-edge angles in [0,180), wraparound-aware.

use crate::model::cv::{RotationEstimate, WallEdgeCandidate};
use crate::model::document::Confidence;

use super::geometry::angle_180_distance;

const KMEANS_ITERATIONS: usize = 10;

/// Circular mean over the [0,180) domain (undirected line angles), using
/// the angle-doubling trick: doubling maps [0,180) onto the full circle
/// so the ordinary `atan2(mean_sin, mean_cos)` mean applies, then halving
/// maps back.
fn circular_mean_180(angles: &[f64]) -> f64 {
    if angles.is_empty() {
        return 0.0;
    }
    let (sum_sin, sum_cos) = angles.iter().fold((0.0, 0.0), |(s, c), &a| {
        let doubled = (a * 2.0).to_radians();
        (s + doubled.sin(), c + doubled.cos())
    });
    let mean_sin = sum_sin / angles.len() as f64;
    let mean_cos = sum_cos / angles.len() as f64;
    (mean_sin.atan2(mean_cos).to_degrees() / 2.0).rem_euclid(180.0)
}

fn stddev_180(angles: &[f64], mean: f64) -> f64 {
    if angles.is_empty() {
        return 0.0;
    }
    let variance = angles.iter().map(|&a| angle_180_distance(a, mean).powi(2)).sum::<f64>() / angles.len() as f64;
    variance.sqrt()
}

fn confidence_for_stddev(stddev: f64) -> Confidence {
    if stddev < 5.0 {
        Confidence::High
    } else if stddev < 10.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Clusters wall-edge angles into two groups by fixed-iteration k-means,
/// picks the cluster with the greatest total length, and returns its mean
/// angle and confidence from the cluster's angular standard deviation.
pub fn estimate_rotation(candidates: &[WallEdgeCandidate]) -> Option<RotationEstimate> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(RotationEstimate {
            rotation_degrees: candidates[0].angle_from_horizontal,
            confidence: Confidence::High,
        });
    }

    let angles: Vec<f64> = candidates.iter().map(|c| c.angle_from_horizontal).collect();
    let min_angle = angles.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_angle = angles.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut centroids = [min_angle, max_angle];

    for _ in 0..KMEANS_ITERATIONS {
        let mut group0 = Vec::new();
        let mut group1 = Vec::new();
        for &a in &angles {
            if angle_180_distance(a, centroids[0]) <= angle_180_distance(a, centroids[1]) {
                group0.push(a);
            } else {
                group1.push(a);
            }
        }
        if !group0.is_empty() {
            centroids[0] = circular_mean_180(&group0);
        }
        if !group1.is_empty() {
            centroids[1] = circular_mean_180(&group1);
        }
    }

    let mut group0_idx = Vec::new();
    let mut group1_idx = Vec::new();
    for (i, &a) in angles.iter().enumerate() {
        if angle_180_distance(a, centroids[0]) <= angle_180_distance(a, centroids[1]) {
            group0_idx.push(i);
        } else {
            group1_idx.push(i);
        }
    }

    let total_length = |idxs: &[usize]| -> f64 { idxs.iter().map(|&i| candidates[i].length_px).sum() };

    let (winner_idxs, winner_centroid) = if total_length(&group0_idx) >= total_length(&group1_idx) {
        (group0_idx, centroids[0])
    } else {
        (group1_idx, centroids[1])
    };

    let winner_angles: Vec<f64> = winner_idxs.iter().map(|&i| angles[i]).collect();
    let stddev = stddev_180(&winner_angles, winner_centroid);

    Some(RotationEstimate {
        rotation_degrees: winner_centroid,
        confidence: confidence_for_stddev(stddev),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cv::GridPosition;

    fn candidate(angle: f64, length: f64) -> WallEdgeCandidate {
        WallEdgeCandidate {
            angle_from_horizontal: angle,
            length_px: length,
            grid_position: GridPosition::Center,
            outward_normal_bearing: (angle + 90.0).rem_euclid(360.0),
        }
    }

    #[test]
    fn test_empty_candidates_yields_none() {
        assert!(estimate_rotation(&[]).is_none());
    }

    #[test]
    fn test_single_candidate_is_high_confidence() {
        let estimate = estimate_rotation(&[candidate(30.0, 200.0)]).unwrap();
        assert_eq!(estimate.rotation_degrees, 30.0);
        assert_eq!(estimate.confidence, Confidence::High);
    }

    #[test]
    fn test_tight_cluster_wins_and_is_high_confidence() {
        let candidates = vec![
            candidate(10.0, 500.0),
            candidate(11.0, 480.0),
            candidate(9.0, 460.0),
            candidate(95.0, 50.0),
        ];
        let estimate = estimate_rotation(&candidates).unwrap();
        assert!(angle_180_distance(estimate.rotation_degrees, 10.0) < 2.0);
        assert_eq!(estimate.confidence, Confidence::High);
    }

    #[test]
    fn test_noisy_cluster_is_lower_confidence() {
        let candidates = vec![
            candidate(0.0, 500.0),
            candidate(20.0, 480.0),
            candidate(160.0, 460.0),
            candidate(175.0, 50.0),
        ];
        let estimate = estimate_rotation(&candidates).unwrap();
        assert_ne!(estimate.confidence, Confidence::High);
    }
}
