//! Results of the two orientation passes and their reconciliation.

use serde::{Deserialize, Serialize};

use super::document::Confidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassNumber {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Success,
    Error,
}

/// One orientation pass's raw output, before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationPassResult {
    pub pass: PassNumber,
    pub status: PassStatus,
    /// Present only when `status == Success`.
    pub bearing: Option<f64>,
    pub confidence: Option<Confidence>,
    pub north_arrow_angle: Option<f64>,
    pub error: Option<String>,
}

impl OrientationPassResult {
    pub fn success(pass: PassNumber, bearing: f64, confidence: Confidence, north_arrow_angle: Option<f64>) -> Self {
        OrientationPassResult {
            pass,
            status: PassStatus::Success,
            bearing: Some(bearing),
            confidence: Some(confidence),
            north_arrow_angle,
            error: None,
        }
    }

    pub fn failure(pass: PassNumber, error: impl Into<String>) -> Self {
        OrientationPassResult {
            pass,
            status: PassStatus::Error,
            bearing: None,
            confidence: None,
            north_arrow_angle: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PassStatus::Success
    }
}

/// Reconciliation category from the §4.5 agreement rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationCategory {
    Agreement,
    SideFrontConfusion,
    FrontBackConfusion,
    Disagreement,
    Pass1Failed,
    Pass2Failed,
    BothFailed,
}

/// Final, fused orientation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationVerification {
    pub final_bearing: f64,
    pub confidence: Confidence,
    pub category: VerificationCategory,
    pub notes: String,
}
