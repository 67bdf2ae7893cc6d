//! Field classification and the `values_match` policy.

use std::collections::HashMap;

use regex::Regex;

use crate::model::value::{DiscrepancyKind, FieldComparison, FieldDiscrepancy, Value};

use super::flatten::flatten;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub percent: f64,
    pub absolute: f64,
}

/// Tolerance-by-category plus the category→field-name-substring map and
/// the non-extractable field patterns, shipped with the verifier as the
/// field-mapping config.
#[derive(Debug, Clone)]
pub struct ToleranceConfig {
    pub default: Tolerance,
    pub categories: HashMap<String, Tolerance>,
    /// category → substrings of a field's leaf name that select it.
    pub category_fields: HashMap<String, Vec<String>>,
    /// Exact paths, `[*]`-wildcarded array paths, or `prefix.*` tail
    /// wildcards.
    pub non_extractable_fields: Vec<String>,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        ToleranceConfig {
            default: Tolerance { percent: 0.5, absolute: 0.01 },
            categories: HashMap::new(),
            category_fields: HashMap::new(),
            non_extractable_fields: Vec::new(),
        }
    }
}

impl ToleranceConfig {
    fn leaf_name(field_path: &str) -> &str {
        field_path.rsplit('.').next().unwrap_or(field_path)
    }

    fn tolerance_for(&self, field_path: &str) -> Tolerance {
        let leaf = Self::leaf_name(field_path);
        for (category, substrings) in &self.category_fields {
            if substrings.iter().any(|s| leaf.contains(s.as_str())) {
                if let Some(tol) = self.categories.get(category) {
                    return *tol;
                }
            }
        }
        self.default
    }

    /// Exact match, `[*]`-wildcard over array indices, or `prefix.*`
    /// wildcard over any tail.
    fn is_non_extractable(&self, field_path: &str) -> bool {
        let array_normalized = array_index_re().replace_all(field_path, "[*]").into_owned();
        for pattern in &self.non_extractable_fields {
            if pattern == field_path || pattern == &array_normalized {
                return true;
            }
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if field_path.starts_with(prefix) && field_path[prefix.len()..].starts_with('.') {
                    return true;
                }
            }
        }
        false
    }
}

fn array_index_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d+\]").unwrap())
}

/// Normalizes text for comparison: lowercase, trim, strip trailing
/// `.,:;`, collapse internal whitespace, and — for name-like fields —
/// strip parenthetical suffixes like `"Foo (3020)"` → `"Foo"` (spec
/// §4.9 step 4).
pub fn normalize_text(text: &str, field_path: &str) -> String {
    let mut s = text.trim().to_lowercase();
    s = trailing_punct_re().replace(&s, "").into_owned();

    let is_name_like = ["name", "window", "wall"].iter().any(|k| field_path.contains(k));
    if is_name_like {
        s = parenthetical_re().replace_all(&s, "").into_owned();
    }

    whitespace_re().replace_all(s.trim(), " ").into_owned()
}

fn trailing_punct_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.,;:]+$").unwrap())
}

fn parenthetical_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^)]*\)\s*").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// `values_match` policy: both-null matches; numeric
/// comparison uses per-category tolerance (`percent` OR `absolute`);
/// string comparison normalizes first; boolean is exact; otherwise
/// attempt numeric coercion, falling back to exact equality.
pub fn values_match(expected: &Value, actual: &Value, field_path: &str, tolerances: &ToleranceConfig) -> bool {
    match (expected, actual) {
        (Value::Null, Value::Null) => true,
        (Value::Number(e), Value::Number(a)) => {
            let tol = tolerances.tolerance_for(field_path);
            let abs_diff = (e - a).abs();
            let rel_diff = if *e != 0.0 { abs_diff / e.abs() } else { abs_diff };
            rel_diff <= tol.percent / 100.0 || abs_diff <= tol.absolute
        }
        (Value::String(e), Value::String(a)) => normalize_text(e, field_path) == normalize_text(a, field_path),
        (Value::Bool(e), Value::Bool(a)) => e == a,
        _ => {
            if let (Some(e), Some(a)) = (expected.as_f64(), actual.as_f64()) {
                return values_match(&Value::Number(e), &Value::Number(a), field_path, tolerances);
            }
            expected == actual
        }
    }
}

/// Classifies a mismatch as `format_error` when expected/actual have
/// incompatible concrete types, excluding numeric-with-numeric (always
/// `wrong_value`); otherwise `wrong_value`.
fn classify_mismatch(expected: &Value, actual: &Value) -> DiscrepancyKind {
    let both_numeric_like = matches!(expected, Value::Number(_)) && matches!(actual, Value::Number(_));
    if both_numeric_like {
        return DiscrepancyKind::WrongValue;
    }
    let same_type = std::mem::discriminant(expected) == std::mem::discriminant(actual);
    if !same_type {
        DiscrepancyKind::FormatError
    } else {
        DiscrepancyKind::WrongValue
    }
}

/// Runs the full field comparator and returns every
/// comparison, matches included — used by reports that show the complete
/// field-by-field picture alongside discrepancies.
pub fn compare_all(ground_truth: &Value, extracted: &Value, tolerances: &ToleranceConfig) -> Vec<FieldComparison> {
    let gt_flat = flatten(ground_truth);
    let ext_flat = flatten(extracted);
    let mut all_paths: Vec<&String> = gt_flat.keys().chain(ext_flat.keys()).collect();
    all_paths.sort();
    all_paths.dedup();

    let mut comparisons = Vec::new();
    for path in all_paths {
        if tolerances.is_non_extractable(path) {
            continue;
        }
        let expected = gt_flat.get(path);
        let actual = ext_flat.get(path);

        match (expected, actual) {
            (Some(e), None) => comparisons.push(FieldComparison {
                path: path.clone(),
                expected: e.clone(),
                actual: Value::Null,
                matched: false,
            }),
            (None, Some(a)) => comparisons.push(FieldComparison {
                path: path.clone(),
                expected: Value::Null,
                actual: a.clone(),
                matched: false,
            }),
            (Some(e), Some(a)) => comparisons.push(FieldComparison {
                path: path.clone(),
                expected: e.clone(),
                actual: a.clone(),
                matched: values_match(e, a, path, tolerances),
            }),
            (None, None) => unreachable!("path came from the union of both maps"),
        }
    }
    comparisons
}

/// Produces the discrepancy list (omissions, hallucinations, mismatches)
/// that the metrics and improvement loop consume — `compare_all` minus
/// the matches.
pub fn discrepancies(ground_truth: &Value, extracted: &Value, tolerances: &ToleranceConfig) -> Vec<FieldDiscrepancy> {
    let gt_flat = flatten(ground_truth);
    let ext_flat = flatten(extracted);
    let mut out = Vec::new();

    for (path, expected) in &gt_flat {
        if tolerances.is_non_extractable(path) {
            continue;
        }
        match ext_flat.get(path) {
            None => out.push(FieldDiscrepancy {
                path: path.clone(),
                expected: expected.clone(),
                actual: Value::Null,
                kind: DiscrepancyKind::Omission,
            }),
            Some(actual) => {
                if !values_match(expected, actual, path, tolerances) {
                    out.push(FieldDiscrepancy {
                        path: path.clone(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                        kind: classify_mismatch(expected, actual),
                    });
                }
            }
        }
    }

    for (path, actual) in &ext_flat {
        if tolerances.is_non_extractable(path) {
            continue;
        }
        if !gt_flat.contains_key(path) {
            out.push(FieldDiscrepancy {
                path: path.clone(),
                expected: Value::Null,
                actual: actual.clone(),
                kind: DiscrepancyKind::Hallucination,
            });
        }
    }

    out
}

/// Convenience: number of leaf fields in a flattened record, used by
/// metrics (`N_gt`, `total_fields_extracted`).
pub fn leaf_count(value: &Value) -> usize {
    flatten(value).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn default_config() -> ToleranceConfig {
        let mut categories = HashMap::new();
        categories.insert("area".to_string(), Tolerance { percent: 0.5, absolute: 0.01 });
        let mut category_fields = HashMap::new();
        category_fields.insert("area".to_string(), vec!["area".to_string()]);
        ToleranceConfig {
            default: Tolerance { percent: 0.5, absolute: 0.01 },
            categories,
            category_fields,
            non_extractable_fields: vec!["project.run_id".to_string(), "extraction_status.*".to_string()],
        }
    }

    #[test]
    fn test_numeric_within_percent_tolerance_matches() {
        let cfg = default_config();
        assert!(values_match(&Value::Number(1000.0), &Value::Number(1004.0), "walls[0].area", &cfg));
    }

    #[test]
    fn test_numeric_outside_tolerance_mismatches() {
        let cfg = default_config();
        assert!(!values_match(&Value::Number(1000.0), &Value::Number(1020.0), "walls[0].area", &cfg));
    }

    #[test]
    fn test_name_normalization_strips_parenthetical() {
        let cfg = default_config();
        assert!(values_match(
            &Value::String("Furnace (3020)".into()),
            &Value::String("furnace".into()),
            "hvac_systems[0].name",
            &cfg
        ));
    }

    #[test]
    fn test_format_error_on_type_mismatch() {
        let kind = classify_mismatch(&Value::String("yes".into()), &Value::Bool(true));
        assert_eq!(kind, DiscrepancyKind::FormatError);
    }

    #[test]
    fn test_numeric_mismatch_is_always_wrong_value() {
        let kind = classify_mismatch(&Value::Number(1.0), &Value::Number(2.0));
        assert_eq!(kind, DiscrepancyKind::WrongValue);
    }

    #[test]
    fn test_non_extractable_exact_path_skipped() {
        let cfg = default_config();
        let mut gt = BTreeMap::new();
        gt.insert("run_id".to_string(), Value::String("abc".into()));
        let mut project = BTreeMap::new();
        project.insert("project".to_string(), Value::Map(gt));
        let gt_value = Value::Map(project.clone());
        let ext_value = Value::Map(BTreeMap::new());
        let d = discrepancies(&gt_value, &ext_value, &cfg);
        assert!(d.is_empty());
    }

    #[test]
    fn test_prefix_wildcard_skips_tail() {
        let cfg = default_config();
        assert!(cfg.is_non_extractable("extraction_status.project.domain"));
        assert!(!cfg.is_non_extractable("extraction_statusZZZ.x"));
    }

    #[test]
    fn test_array_wildcard_normalization() {
        let mut cfg = default_config();
        cfg.non_extractable_fields.push("walls[*].internal_id".to_string());
        assert!(cfg.is_non_extractable("walls[3].internal_id"));
    }

    #[test]
    fn test_omission_and_hallucination_classified() {
        let cfg = default_config();
        let mut gt_map = BTreeMap::new();
        gt_map.insert("climate_zone".to_string(), Value::String("12".into()));
        let gt = Value::Map(gt_map);

        let mut ext_map = BTreeMap::new();
        ext_map.insert("bedrooms".to_string(), Value::Number(3.0));
        let ext = Value::Map(ext_map);

        let d = discrepancies(&gt, &ext, &cfg);
        assert_eq!(d.len(), 2);
        assert!(d.iter().any(|x| x.kind == DiscrepancyKind::Omission && x.path == "climate_zone"));
        assert!(d.iter().any(|x| x.kind == DiscrepancyKind::Hallucination && x.path == "bedrooms"));
    }
}
