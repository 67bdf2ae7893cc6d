//! Evaluation-result history and instruction-improvement proposals, used by
//! the iteration store and the improvement loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::value::FieldDiscrepancy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsBlock {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
}

/// Output of one verification run against one evaluation's extracted
/// record, persisted by the iteration store as `eval-results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub metrics: MetricsBlock,
    pub discrepancies: Vec<FieldDiscrepancy>,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

/// One entry in a per-evaluation aggregate history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub timestamp: DateTime<Utc>,
    pub trend: f64,
}

/// Per-evaluation ordered history plus best-score tracking, persisted as
/// `aggregate.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationAggregate {
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub error_counts_by_iteration: HashMap<u32, HashMap<String, u32>>,
    pub best_f1: f64,
    pub best_iteration: u32,
}

impl IterationAggregate {
    /// Appends a history entry computing `trend` against the previous
    /// entry (0 for the first), and updates `best_f1`/`best_iteration` if
    /// the new f1 is >= the current best.
    pub fn record(&mut self, iteration: u32, metrics: MetricsBlock, timestamp: DateTime<Utc>, error_counts: HashMap<String, u32>) {
        let trend = self.history.last().map(|h| metrics.f1 - h.f1).unwrap_or(0.0);
        self.history.push(HistoryEntry {
            iteration,
            f1: metrics.f1,
            precision: metrics.precision,
            recall: metrics.recall,
            timestamp,
            trend,
        });
        self.error_counts_by_iteration.insert(iteration, error_counts);
        if metrics.f1 >= self.best_f1 {
            self.best_f1 = metrics.f1;
            self.best_iteration = iteration;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AddSection,
    ModifySection,
    ClarifyRule,
    AddExample,
    FixTypo,
    Restructure,
}

impl ChangeKind {
    /// Which part of the `major.minor.patch` triple this change kind bumps,
    ///.
    pub fn version_bump(self) -> VersionBump {
        match self {
            ChangeKind::AddSection => VersionBump::Minor,
            ChangeKind::ModifySection => VersionBump::Minor,
            ChangeKind::ClarifyRule => VersionBump::Patch,
            ChangeKind::FixTypo => VersionBump::Patch,
            ChangeKind::Restructure => VersionBump::Major,
            ChangeKind::AddExample => VersionBump::Patch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
}

/// A proposed instruction-file change parsed from the critic agent's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionProposal {
    pub target_file: String,
    pub current_version: String,
    pub proposed_version: String,
    pub change_kind: ChangeKind,
    pub failure_pattern: String,
    pub hypothesis: String,
    pub text_to_insert: String,
    #[serde(default)]
    pub affected_error_types: Vec<String>,
    #[serde(default)]
    pub affected_domains: Vec<String>,
}
