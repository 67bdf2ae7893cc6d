//! Precision/recall/F1 over TP/FP/FN counts, and macro/micro
//! aggregation across evaluations.

use std::collections::HashMap;

use crate::model::iteration::MetricsBlock;
use crate::model::value::{DiscrepancyKind, FieldDiscrepancy};

/// Counts of each discrepancy kind, keyed by its canonical name.
pub fn errors_by_type(discrepancies: &[FieldDiscrepancy]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for kind in [
        DiscrepancyKind::Omission,
        DiscrepancyKind::Hallucination,
        DiscrepancyKind::WrongValue,
        DiscrepancyKind::FormatError,
    ] {
        counts.insert(kind_name(kind).to_string(), 0);
    }
    for d in discrepancies {
        *counts.entry(kind_name(d.kind).to_string()).or_insert(0) += 1;
    }
    counts
}

fn kind_name(kind: DiscrepancyKind) -> &'static str {
    match kind {
        DiscrepancyKind::Omission => "omission",
        DiscrepancyKind::Hallucination => "hallucination",
        DiscrepancyKind::WrongValue => "wrong_value",
        DiscrepancyKind::FormatError => "format_error",
    }
}

/// Computes precision/recall/F1 for one evaluation:
/// `TP = N_gt - omissions - wrong_values - format_errors` (clamped at 0),
/// `FP = hallucinations + wrong_values + format_errors`, `FN = omissions`.
pub fn compute_metrics(discrepancies: &[FieldDiscrepancy], total_fields_gt: u32) -> MetricsBlock {
    let omissions = discrepancies.iter().filter(|d| d.kind == DiscrepancyKind::Omission).count() as u32;
    let hallucinations = discrepancies.iter().filter(|d| d.kind == DiscrepancyKind::Hallucination).count() as u32;
    let wrong_values = discrepancies.iter().filter(|d| d.kind == DiscrepancyKind::WrongValue).count() as u32;
    let format_errors = discrepancies.iter().filter(|d| d.kind == DiscrepancyKind::FormatError).count() as u32;

    let true_positives = total_fields_gt.saturating_sub(omissions + wrong_values + format_errors);
    let false_positives = hallucinations + wrong_values + format_errors;
    let false_negatives = omissions;

    let precision = ratio(true_positives, true_positives + false_positives);
    let recall = ratio(true_positives, true_positives + false_negatives);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    MetricsBlock {
        precision,
        recall,
        f1,
        true_positives,
        false_positives,
        false_negatives,
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Macro- and micro-averaged metrics across a set of per-evaluation
/// results. Macro is the primary metric.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateMetrics {
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub micro_precision: f64,
    pub micro_recall: f64,
    pub micro_f1: f64,
    pub num_evals: usize,
}

pub fn aggregate_metrics(per_eval: &[MetricsBlock]) -> AggregateMetrics {
    if per_eval.is_empty() {
        return AggregateMetrics::default();
    }
    let n = per_eval.len() as f64;

    let macro_precision = per_eval.iter().map(|m| m.precision).sum::<f64>() / n;
    let macro_recall = per_eval.iter().map(|m| m.recall).sum::<f64>() / n;
    let macro_f1 = per_eval.iter().map(|m| m.f1).sum::<f64>() / n;

    let total_tp: u32 = per_eval.iter().map(|m| m.true_positives).sum();
    let total_fp: u32 = per_eval.iter().map(|m| m.false_positives).sum();
    let total_fn: u32 = per_eval.iter().map(|m| m.false_negatives).sum();

    let micro_precision = ratio(total_tp, total_tp + total_fp);
    let micro_recall = ratio(total_tp, total_tp + total_fn);
    let micro_f1 = if micro_precision + micro_recall > 0.0 {
        2.0 * micro_precision * micro_recall / (micro_precision + micro_recall)
    } else {
        0.0
    };

    AggregateMetrics {
        macro_precision,
        macro_recall,
        macro_f1,
        micro_precision,
        micro_recall,
        micro_f1,
        num_evals: per_eval.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::Value;

    fn discrepancy(kind: DiscrepancyKind) -> FieldDiscrepancy {
        FieldDiscrepancy { path: "x".into(), expected: Value::Null, actual: Value::Null, kind }
    }

    #[test]
    fn test_metrics_with_no_errors_is_perfect() {
        let m = compute_metrics(&[], 10);
        assert_eq!(m.true_positives, 10);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
    }

    #[test]
    fn test_metrics_all_omitted_yields_zero_recall() {
        let d: Vec<_> = (0..5).map(|_| discrepancy(DiscrepancyKind::Omission)).collect();
        let m = compute_metrics(&d, 5);
        assert_eq!(m.true_positives, 0);
        assert_eq!(m.false_negatives, 5);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn test_metrics_hallucination_only_affects_precision() {
        let d = vec![discrepancy(DiscrepancyKind::Hallucination)];
        let m = compute_metrics(&d, 4);
        assert_eq!(m.true_positives, 4);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.false_negatives, 0);
        assert!(m.precision < 1.0);
        assert_eq!(m.recall, 1.0);
    }

    #[test]
    fn test_macro_and_micro_aggregate() {
        let per_eval = vec![
            MetricsBlock { precision: 1.0, recall: 1.0, f1: 1.0, true_positives: 10, false_positives: 0, false_negatives: 0 },
            MetricsBlock { precision: 0.5, recall: 0.5, f1: 0.5, true_positives: 5, false_positives: 5, false_negatives: 5 },
        ];
        let agg = aggregate_metrics(&per_eval);
        assert!((agg.macro_f1 - 0.75).abs() < 1e-9);
        assert!((agg.micro_precision - 15.0 / 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_of_empty_is_zeroed() {
        let agg = aggregate_metrics(&[]);
        assert_eq!(agg.num_evals, 0);
        assert_eq!(agg.macro_f1, 0.0);
    }

    #[test]
    fn test_errors_by_type_counts_all_kinds() {
        let d = vec![
            discrepancy(DiscrepancyKind::Omission),
            discrepancy(DiscrepancyKind::Omission),
            discrepancy(DiscrepancyKind::Hallucination),
        ];
        let counts = errors_by_type(&d);
        assert_eq!(counts["omission"], 2);
        assert_eq!(counts["hallucination"], 1);
        assert_eq!(counts["wrong_value"], 0);
    }
}
