//! The field comparator and its metrics. Flattens heterogeneous
//! nested records into dotted-path `Value` maps, matches them against
//! ground truth with type- and category-aware tolerance, categorizes
//! every mismatch, and computes precision/recall/F1 both per-evaluation
//! and in aggregate.

pub mod compare;
pub mod flatten;
pub mod metrics;

pub use compare::{compare_all, discrepancies, leaf_count, normalize_text, values_match, Tolerance, ToleranceConfig};
pub use flatten::flatten;
pub use metrics::{aggregate_metrics, compute_metrics, errors_by_type, AggregateMetrics};
