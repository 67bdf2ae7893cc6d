//! The iteration store, encapsulating the filesystem-as-database layout for
//! evaluation results. Callers never build these paths directly —
//! `IterationStore` is the only module that knows the directory convention.
//!
//! ```text
//! evals/<eval_id>/results/
//!     iteration-NNN/
//!         extracted.json
//!         eval-results.json
//!         eval-report.html        (optional)
//!         instruction-changes/    (optional)
//!             <agent>-<file>-v<ver>.md
//!     aggregate.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;

use crate::error::{Error, Result};
use crate::model::iteration::{EvaluationResult, IterationAggregate, MetricsBlock};

/// Filesystem-as-database encapsulation for one `evals/` root. Never
/// overwrites an existing iteration directory — every iteration is an
/// atomic new directory.
pub struct IterationStore {
    pub evals_dir: PathBuf,
}

impl IterationStore {
    pub fn new(evals_dir: impl Into<PathBuf>) -> Self {
        IterationStore { evals_dir: evals_dir.into() }
    }

    pub fn results_dir(&self, eval_id: &str) -> PathBuf {
        self.evals_dir.join(eval_id).join("results")
    }

    pub fn iteration_dir(&self, eval_id: &str, iteration: u32) -> PathBuf {
        self.results_dir(eval_id).join(format!("iteration-{iteration:03}"))
    }

    fn aggregate_path(&self, eval_id: &str) -> PathBuf {
        self.results_dir(eval_id).join("aggregate.json")
    }

    /// Next iteration number: max existing + 1, or 1 if none exist
    ///.
    pub fn next_iteration(&self, eval_id: &str) -> Result<u32> {
        let dir = self.results_dir(eval_id);
        if !dir.exists() {
            return Ok(1);
        }
        let iter_re = Regex::new(r"^iteration-(\d+)$").expect("static pattern");
        let max = std::fs::read_dir(&dir)
            .map_err(|e| io_err(&dir, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                iter_re.captures(&name).and_then(|c| c[1].parse::<u32>().ok())
            })
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Saves one iteration's `extracted.json` and `eval-results.json`,
    /// then atomically updates `aggregate.json`.
    pub fn save_iteration(&self, eval_id: &str, extracted: &serde_json::Value, result: &EvaluationResult) -> Result<PathBuf> {
        let iter_dir = self.iteration_dir(eval_id, result.iteration);
        std::fs::create_dir_all(&iter_dir).map_err(|e| io_err(&iter_dir, e))?;

        let extracted_path = iter_dir.join("extracted.json");
        std::fs::write(&extracted_path, serde_json::to_string_pretty(extracted)?).map_err(|e| io_err(&extracted_path, e))?;

        let results_path = iter_dir.join("eval-results.json");
        std::fs::write(&results_path, serde_json::to_string_pretty(result)?).map_err(|e| io_err(&results_path, e))?;

        self.update_aggregate(eval_id, result)?;
        Ok(iter_dir)
    }

    fn update_aggregate(&self, eval_id: &str, result: &EvaluationResult) -> Result<()> {
        let mut aggregate = self.load_aggregate(eval_id)?.unwrap_or_default();
        let error_counts = crate::verify::errors_by_type(&result.discrepancies);
        aggregate.record(result.iteration, result.metrics, result.timestamp, error_counts);

        let path = self.aggregate_path(eval_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&aggregate)?).map_err(|e| io_err(&path, e))
    }

    pub fn load_aggregate(&self, eval_id: &str) -> Result<Option<IterationAggregate>> {
        let path = self.aggregate_path(eval_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn load_iteration(&self, eval_id: &str, iteration: u32) -> Result<Option<EvaluationResult>> {
        let path = self.iteration_dir(eval_id, iteration).join("eval-results.json");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Latest iteration number recorded for `eval_id`, or `None` if none
    /// exist yet.
    pub fn latest_iteration(&self, eval_id: &str) -> Result<Option<u32>> {
        let next = self.next_iteration(eval_id)?;
        Ok(if next > 1 { Some(next - 1) } else { None })
    }

    /// Saves a pre-change snapshot of an instruction file into this
    /// iteration's `instruction-changes/` directory, named
    /// `<agent>-<file>-v<ver>.md`.
    pub fn save_instruction_snapshot(&self, eval_id: &str, iteration: u32, agent_name: &str, target_path: &Path, version: &str) -> Result<PathBuf> {
        let changes_dir = self.iteration_dir(eval_id, iteration).join("instruction-changes");
        std::fs::create_dir_all(&changes_dir).map_err(|e| io_err(&changes_dir, e))?;

        let file_stem = target_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let snapshot_path = changes_dir.join(format!("{agent_name}-{file_stem}-v{version}.md"));
        std::fs::copy(target_path, &snapshot_path).map_err(|e| io_err(target_path, e))?;
        Ok(snapshot_path)
    }

    /// Restores every instruction-file snapshot recorded under
    /// `iteration-NNN/instruction-changes/` back to its original path,
    /// keyed by `<agent>-<file>-v*.md`.
    pub fn rollback(&self, eval_id: &str, iteration: u32, restore: impl Fn(&str) -> Option<PathBuf>) -> Result<Vec<PathBuf>> {
        let changes_dir = self.iteration_dir(eval_id, iteration).join("instruction-changes");
        if !changes_dir.exists() {
            return Ok(Vec::new());
        }
        let snapshot_re = Regex::new(r"^(?P<agent>[^-]+)-(?P<file>.+)-v[^-]+\.md$").expect("static pattern");
        let mut restored = Vec::new();

        for entry in std::fs::read_dir(&changes_dir).map_err(|e| io_err(&changes_dir, e))? {
            let entry = entry.map_err(|e| io_err(&changes_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = snapshot_re.captures(&name) else { continue };
            let key = format!("{}/{}", &caps["agent"], &caps["file"]);
            if let Some(target) = restore(&key) {
                std::fs::copy(entry.path(), &target).map_err(|e| io_err(&target, e))?;
                restored.push(target);
            }
        }
        Ok(restored)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> Error {
    Error::IterationStoreIo {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Builds an `EvaluationResult` ready to persist, stamping the current
/// UTC timestamp in ISO-8601 form.
pub fn build_result(iteration: u32, metrics: MetricsBlock, discrepancies: Vec<crate::model::value::FieldDiscrepancy>) -> EvaluationResult {
    EvaluationResult {
        metrics,
        discrepancies,
        iteration,
        timestamp: Utc::now(),
    }
}

/// Per-domain discrepancy counts keyed by the top-level path segment
///, shared with the improvement loop's aggregation.
pub fn errors_by_domain(discrepancies: &[crate::model::value::FieldDiscrepancy]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for d in discrepancies {
        let domain = d.path.split(['.', '[']).next().unwrap_or(&d.path);
        *counts.entry(domain.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::{DiscrepancyKind, FieldDiscrepancy, Value};
    use tempfile::tempdir;

    fn sample_result(iteration: u32, f1: f64) -> EvaluationResult {
        build_result(
            iteration,
            MetricsBlock { f1, precision: f1, recall: f1, true_positives: 8, false_positives: 1, false_negatives: 1 },
            vec![FieldDiscrepancy {
                path: "walls[0].name".into(),
                expected: Value::String("N Wall".into()),
                actual: Value::Null,
                kind: DiscrepancyKind::Omission,
            }],
        )
    }

    #[test]
    fn test_next_iteration_starts_at_one() {
        let dir = tempdir().unwrap();
        let store = IterationStore::new(dir.path());
        assert_eq!(store.next_iteration("chamberlin").unwrap(), 1);
    }

    #[test]
    fn test_next_iteration_increments_after_save() {
        let dir = tempdir().unwrap();
        let store = IterationStore::new(dir.path());
        store.save_iteration("chamberlin", &serde_json::json!({}), &sample_result(1, 0.8)).unwrap();
        assert_eq!(store.next_iteration("chamberlin").unwrap(), 2);
    }

    #[test]
    fn test_next_iteration_skips_gaps() {
        let dir = tempdir().unwrap();
        let store = IterationStore::new(dir.path());
        store.save_iteration("chamberlin", &serde_json::json!({}), &sample_result(3, 0.9)).unwrap();
        assert_eq!(store.next_iteration("chamberlin").unwrap(), 4);
    }

    #[test]
    fn test_aggregate_tracks_best_and_trend() {
        let dir = tempdir().unwrap();
        let store = IterationStore::new(dir.path());
        store.save_iteration("chamberlin", &serde_json::json!({}), &sample_result(1, 0.5)).unwrap();
        store.save_iteration("chamberlin", &serde_json::json!({}), &sample_result(2, 0.7)).unwrap();
        let aggregate = store.load_aggregate("chamberlin").unwrap().unwrap();
        assert_eq!(aggregate.best_iteration, 2);
        assert!((aggregate.history[1].trend - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_load_iteration_round_trips() {
        let dir = tempdir().unwrap();
        let store = IterationStore::new(dir.path());
        let result = sample_result(1, 0.6);
        store.save_iteration("chamberlin", &serde_json::json!({"x": 1}), &result).unwrap();
        let loaded = store.load_iteration("chamberlin", 1).unwrap().unwrap();
        assert_eq!(loaded.iteration, 1);
        assert_eq!(loaded.discrepancies.len(), 1);
    }

    #[test]
    fn test_snapshot_and_rollback_round_trip() {
        let dir = tempdir().unwrap();
        let store = IterationStore::new(dir.path());
        store.save_iteration("chamberlin", &serde_json::json!({}), &sample_result(1, 0.5)).unwrap();

        let instructions_dir = dir.path().join("instructions").join("zones");
        std::fs::create_dir_all(&instructions_dir).unwrap();
        let target = instructions_dir.join("rules.md");
        std::fs::write(&target, "# Rules v1.0.0\noriginal").unwrap();

        store.save_instruction_snapshot("chamberlin", 1, "zones", &target, "1.0.0").unwrap();
        std::fs::write(&target, "# Rules v1.1.0\nmutated").unwrap();

        let restored = store
            .rollback("chamberlin", 1, |key| if key == "zones/rules" { Some(target.clone()) } else { None })
            .unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Rules v1.0.0\noriginal");
    }

    #[test]
    fn test_errors_by_domain_extracts_top_level_segment() {
        let d = vec![
            FieldDiscrepancy { path: "walls[0].name".into(), expected: Value::Null, actual: Value::Null, kind: DiscrepancyKind::Omission },
            FieldDiscrepancy { path: "project.climate_zone".into(), expected: Value::Null, actual: Value::Null, kind: DiscrepancyKind::Omission },
        ];
        let counts = errors_by_domain(&d);
        assert_eq!(counts["walls"], 1);
        assert_eq!(counts["project"], 1);
    }
}
