//! Orientation fusion. Two independent bearing-estimation passes run
//! concurrently, seeded by CV hints, and are reconciled by agreement rules
//! below.

use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::agent::{extract_json_object, AgentExecutor};
use crate::cv::geometry::{angular_distance, circular_mean};
use crate::model::cv::CvHints;
use crate::model::document::Confidence;
use crate::model::orientation::{OrientationPassResult, OrientationVerification, PassNumber, PassStatus, VerificationCategory};

const ORIENTATION_TIMEOUT: Duration = Duration::from_secs(600);

const AGREEMENT_THRESHOLD: f64 = 20.0;
const SIDE_FRONT_MIN: f64 = 70.0;
const SIDE_FRONT_MAX: f64 = 110.0;
const FRONT_BACK_MIN: f64 = 160.0;
const FRONT_BACK_MAX: f64 = 200.0;

#[derive(Debug, serde::Deserialize)]
struct RawPassReply {
    bearing: Option<f64>,
    confidence: Option<Confidence>,
    north_arrow_angle: Option<f64>,
}

fn pass_prompt(pass: PassNumber, cv_hints: &CvHints) -> String {
    let task = match pass {
        PassNumber::One => "Find the north arrow on the site plan and infer the building's front from the street/entry relationship.",
        PassNumber::Two => "Match elevation drawing labels to building faces to determine the building's front orientation.",
    };
    format!(
        "{task}\n\nComputer-vision hints:\n{}",
        serde_json::to_string(cv_hints).unwrap_or_default()
    )
}

async fn run_pass(executor: &dyn AgentExecutor, semaphore: &Semaphore, pass: PassNumber, cv_hints: &CvHints) -> OrientationPassResult {
    let agent_name = match pass {
        PassNumber::One => "orientation_pass1",
        PassNumber::Two => "orientation_pass2",
    };
    let prompt = pass_prompt(pass, cv_hints);

    let _permit = semaphore.acquire().await.expect("semaphore closed");
    let reply = match executor.run(agent_name, &prompt, ORIENTATION_TIMEOUT).await {
        Ok(r) => r,
        Err(e) => return OrientationPassResult::failure(pass, e.to_string()),
    };

    let parsed: Result<RawPassReply, String> = extract_json_object(&reply)
        .map_err(|e| e.to_string())
        .and_then(|v| serde_json::from_value(v).map_err(|e| e.to_string()));

    match parsed {
        Ok(raw) => match (raw.bearing, raw.confidence) {
            (Some(bearing), Some(confidence)) => {
                OrientationPassResult::success(pass, bearing.rem_euclid(360.0), confidence, raw.north_arrow_angle)
            }
            _ => OrientationPassResult::failure(pass, "reply missing bearing or confidence"),
        },
        Err(e) => OrientationPassResult::failure(pass, e),
    }
}

/// Runs both orientation passes concurrently, launched in parallel as soon
/// as CV hints are available. `semaphore` is the process-wide bound shared
/// with discovery and domain fan-out for this evaluation — both passes
/// acquire from it before spawning their agent call.
pub async fn run_both_passes(executor: &dyn AgentExecutor, semaphore: &Semaphore, cv_hints: &CvHints) -> (OrientationPassResult, OrientationPassResult) {
    let (p1, p2) = tokio::join!(
        run_pass(executor, semaphore, PassNumber::One, cv_hints),
        run_pass(executor, semaphore, PassNumber::Two, cv_hints)
    );
    (p1, p2)
}

fn higher_confidence<'a>(p1: &'a OrientationPassResult, p2: &'a OrientationPassResult) -> &'a OrientationPassResult {
    let r1 = p1.confidence.map(|c| c.rank()).unwrap_or(0);
    let r2 = p2.confidence.map(|c| c.rank()).unwrap_or(0);
    // Tie goes to pass 1.
    if r2 > r1 {
        p2
    } else {
        p1
    }
}

/// Reconciles two orientation passes by their agreement in reported bearing.
/// Circular mean and angular distance handle the 359°/1° wraparound
/// without the 180°-flip error a linear mean would produce.
pub fn reconcile(p1: &OrientationPassResult, p2: &OrientationPassResult) -> OrientationVerification {
    match (p1.is_success(), p2.is_success()) {
        (false, false) => {
            warn!("both orientation passes failed; falling back to 0.0");
            OrientationVerification {
                final_bearing: 0.0,
                confidence: Confidence::Low,
                category: VerificationCategory::BothFailed,
                notes: "both orientation passes failed".into(),
            }
        }
        (true, false) => OrientationVerification {
            final_bearing: p1.bearing.unwrap(),
            confidence: p1.confidence.unwrap(),
            category: VerificationCategory::Pass2Failed,
            notes: format!("pass 2 failed: {}", p2.error.clone().unwrap_or_default()),
        },
        (false, true) => OrientationVerification {
            final_bearing: p2.bearing.unwrap(),
            confidence: p2.confidence.unwrap(),
            category: VerificationCategory::Pass1Failed,
            notes: format!("pass 1 failed: {}", p1.error.clone().unwrap_or_default()),
        },
        (true, true) => {
            let b1 = p1.bearing.unwrap();
            let b2 = p2.bearing.unwrap();
            let delta = angular_distance(b1, b2);

            if delta <= AGREEMENT_THRESHOLD {
                info!(delta, "orientation passes agree");
                OrientationVerification {
                    final_bearing: circular_mean(&[b1, b2]),
                    confidence: Confidence::High,
                    category: VerificationCategory::Agreement,
                    notes: format!("passes agree within {delta:.1}°"),
                }
            } else if (SIDE_FRONT_MIN..=SIDE_FRONT_MAX).contains(&delta) {
                let winner = higher_confidence(p1, p2);
                OrientationVerification {
                    final_bearing: winner.bearing.unwrap(),
                    confidence: Confidence::Low,
                    category: VerificationCategory::SideFrontConfusion,
                    notes: format!("side/front confusion, delta {delta:.1}°"),
                }
            } else if (FRONT_BACK_MIN..=FRONT_BACK_MAX).contains(&delta) {
                let winner = higher_confidence(p1, p2);
                OrientationVerification {
                    final_bearing: winner.bearing.unwrap(),
                    confidence: Confidence::Low,
                    category: VerificationCategory::FrontBackConfusion,
                    notes: format!("front/back confusion, delta {delta:.1}°"),
                }
            } else {
                let winner = higher_confidence(p1, p2);
                OrientationVerification {
                    final_bearing: winner.bearing.unwrap(),
                    confidence: Confidence::Low,
                    category: VerificationCategory::Disagreement,
                    notes: format!("disagreement, delta {delta:.1}°"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(bearing: f64, confidence: Confidence) -> OrientationPassResult {
        OrientationPassResult::success(PassNumber::One, bearing, confidence, None)
    }

    #[test]
    fn test_agreement_uses_circular_mean() {
        let p1 = OrientationPassResult::success(PassNumber::One, 72.0, Confidence::High, None);
        let p2 = OrientationPassResult::success(PassNumber::Two, 74.0, Confidence::Medium, None);
        let result = reconcile(&p1, &p2);
        assert_eq!(result.category, VerificationCategory::Agreement);
        assert!((result.final_bearing - 73.0).abs() < 0.1);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_side_front_confusion_picks_higher_confidence() {
        let p1 = OrientationPassResult::success(PassNumber::One, 90.0, Confidence::Medium, None);
        let p2 = OrientationPassResult::success(PassNumber::Two, 0.0, Confidence::High, None);
        let result = reconcile(&p1, &p2);
        assert_eq!(result.category, VerificationCategory::SideFrontConfusion);
        assert_eq!(result.final_bearing, 0.0);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn test_front_back_confusion() {
        let p1 = success(10.0, Confidence::High);
        let p2 = OrientationPassResult::success(PassNumber::Two, 185.0, Confidence::Low, None);
        let result = reconcile(&p1, &p2);
        assert_eq!(result.category, VerificationCategory::FrontBackConfusion);
        assert_eq!(result.final_bearing, 10.0);
    }

    #[test]
    fn test_disagreement_ties_to_pass1() {
        let p1 = success(10.0, Confidence::Medium);
        let p2 = OrientationPassResult::success(PassNumber::Two, 140.0, Confidence::Medium, None);
        let result = reconcile(&p1, &p2);
        assert_eq!(result.category, VerificationCategory::Disagreement);
        assert_eq!(result.final_bearing, 10.0);
    }

    #[test]
    fn test_one_pass_failed_uses_survivor() {
        let p1 = success(42.0, Confidence::Medium);
        let p2 = OrientationPassResult::failure(PassNumber::Two, "timeout");
        let result = reconcile(&p1, &p2);
        assert_eq!(result.category, VerificationCategory::Pass2Failed);
        assert_eq!(result.final_bearing, 42.0);
    }

    #[test]
    fn test_both_failed_falls_back_to_zero() {
        let p1 = OrientationPassResult::failure(PassNumber::One, "x");
        let p2 = OrientationPassResult::failure(PassNumber::Two, "y");
        let result = reconcile(&p1, &p2);
        assert_eq!(result.category, VerificationCategory::BothFailed);
        assert_eq!(result.final_bearing, 0.0);
        assert_eq!(result.confidence, Confidence::Low);
    }
}
