//! Evaluation manifest, field-mapping config, and ground-truth CSV loaders
//!'s
//! `load_ground_truth_csv`/`set_nested_value_with_arrays`/`parse_value`).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::value::Value;
use crate::verify::{Tolerance, ToleranceConfig};

/// `evals/manifest.yaml`: a mapping `evals: { <id>: { ... } }` enumerating
/// every evaluation. Per-entry shape is left open — callers that
/// need more than the id read the raw YAML value.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub evals: HashMap<String, serde_yaml::Value>,
}

impl Manifest {
    pub fn eval_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.evals.keys().cloned().collect();
        ids.sort();
        ids
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::Manifest(format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&text).map_err(Error::from)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArrayMapping {
    pub csv_section: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TomlTolerance {
    pub percent: f64,
    pub absolute: f64,
}

/// `csv_to_json`, `array_mappings`, `tolerances`, `tolerance_categories`,
/// `non_extractable_fields` — shipped with the verifier as a TOML file
///.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMappingConfig {
    #[serde(default)]
    pub csv_to_json: HashMap<String, String>,
    #[serde(default)]
    pub array_mappings: HashMap<String, ArrayMapping>,
    #[serde(default)]
    pub tolerances: HashMap<String, TomlTolerance>,
    #[serde(default)]
    pub tolerance_categories: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub non_extractable_fields: Vec<String>,
}

impl FieldMappingConfig {
    pub fn to_tolerance_config(&self) -> ToleranceConfig {
        let default = self
            .tolerances
            .get("default")
            .map(|t| Tolerance { percent: t.percent, absolute: t.absolute })
            .unwrap_or(Tolerance { percent: 0.5, absolute: 0.01 });

        let categories = self
            .tolerances
            .iter()
            .filter(|(name, _)| name.as_str() != "default")
            .map(|(name, t)| (name.clone(), Tolerance { percent: t.percent, absolute: t.absolute }))
            .collect();

        ToleranceConfig {
            default,
            categories,
            category_fields: self.tolerance_categories.clone(),
            non_extractable_fields: self.non_extractable_fields.clone(),
        }
    }

    /// Reverse lookup from a CSV array-section marker to its json key and
    /// header→field map, built once per parse.
    fn section_lookup(&self) -> HashMap<String, (String, &HashMap<String, String>)> {
        self.array_mappings
            .iter()
            .filter(|(_, mapping)| !mapping.csv_section.is_empty())
            .map(|(json_key, mapping)| (mapping.csv_section.clone(), (json_key.clone(), &mapping.fields)))
            .collect()
    }
}

pub fn load_field_mapping(path: &Path) -> Result<FieldMappingConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
    toml::from_str(&text).map_err(Error::from)
}

/// Parses a value cell the way CBECC-style ground-truth CSVs encode it:
/// blank → skipped, `yes`/`true`/`no`/`false` → bool, else numeric if it
/// parses, else the trimmed string.
fn parse_csv_value(raw: &str) -> Option<Value> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }
    let lower = s.to_lowercase();
    if lower == "yes" || lower == "true" {
        return Some(Value::Bool(true));
    }
    if lower == "no" || lower == "false" {
        return Some(Value::Bool(false));
    }
    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            return Some(Value::Number(f));
        }
    } else if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i as f64));
    }
    Some(Value::String(s.to_string()))
}

struct PathSegment {
    key: String,
    index: Option<usize>,
}

fn array_segment_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+)\[(\d+)\]$").unwrap())
}

fn parse_json_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .map(|part| match array_segment_re().captures(part) {
            Some(caps) => PathSegment {
                key: caps[1].to_string(),
                index: caps[2].parse().ok(),
            },
            None => PathSegment { key: part.to_string(), index: None },
        })
        .collect()
}

/// Writes `value` at `segments` within `current`, creating intermediate
/// maps and extending lists as needed (ported from
/// `set_nested_value_with_arrays`).
fn set_path(current: &mut Value, segments: &[PathSegment], value: Value) {
    if !matches!(current, Value::Map(_)) {
        *current = Value::Map(BTreeMap::new());
    }
    let Value::Map(map) = current else { unreachable!() };
    let seg = &segments[0];

    if let Some(idx) = seg.index {
        let entry = map.entry(seg.key.clone()).or_insert_with(|| Value::List(Vec::new()));
        if !matches!(entry, Value::List(_)) {
            *entry = Value::List(Vec::new());
        }
        let Value::List(items) = entry else { unreachable!() };
        while items.len() <= idx {
            items.push(Value::Map(BTreeMap::new()));
        }
        if segments.len() == 1 {
            items[idx] = value;
        } else {
            set_path(&mut items[idx], &segments[1..], value);
        }
    } else if segments.len() == 1 {
        map.insert(seg.key.clone(), value);
    } else {
        let entry = map.entry(seg.key.clone()).or_insert_with(|| Value::Map(BTreeMap::new()));
        set_path(entry, &segments[1..], value);
    }
}

fn default_field_name(header: &str) -> String {
    header.to_lowercase().replace(' ', "_").replace(['(', ')'], "")
}

/// Parses a CBECC-style ground-truth CSV: section headers and array rows
/// in column B/C, regular key-value rows elsewhere, per `mapping`'s
/// `csv_to_json`/`array_mappings`.
pub fn parse_ground_truth_csv(path: &Path, mapping: &FieldMappingConfig) -> Result<Value> {
    let section_lookup = mapping.section_lookup();
    let mut result = Value::Map(BTreeMap::new());

    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_path(path)?;

    let mut current_json_key: Option<String> = None;
    let mut current_headers: Vec<String> = Vec::new();
    let mut current_fields: HashMap<String, String> = HashMap::new();
    let mut in_section = false;

    for record in reader.records() {
        let row = record?;
        let cells: Vec<&str> = row.iter().collect();

        if cells.is_empty() || cells.iter().all(|c| c.trim().is_empty()) {
            in_section = false;
            current_headers.clear();
            continue;
        }

        if cells.len() >= 3 && cells[1].trim().ends_with(':') {
            let section_name = cells[1].trim().to_string();
            if let Some((json_key, fields)) = section_lookup.get(&section_name) {
                in_section = true;
                current_json_key = Some(json_key.clone());
                current_fields = fields.clone();
                current_headers = cells[2..].iter().map(|c| c.trim().to_string()).collect();
                if let Value::Map(map) = &mut result {
                    map.entry(json_key.clone()).or_insert_with(|| Value::List(Vec::new()));
                }
                continue;
            }
        }

        if in_section && cells.len() >= 3 && cells[0].trim().is_empty() && cells[1].trim().is_empty() && !cells[2].trim().is_empty() {
            let values = &cells[2..];
            let mut item = BTreeMap::new();
            for (i, header) in current_headers.iter().enumerate() {
                let Some(raw) = values.get(i) else { continue };
                if raw.trim().is_empty() {
                    continue;
                }
                let json_field = current_fields.get(header).cloned().unwrap_or_else(|| default_field_name(header));
                if let Some(parsed) = parse_csv_value(raw) {
                    item.insert(json_field, parsed);
                }
            }
            if !item.is_empty() {
                if let (Value::Map(map), Some(key)) = (&mut result, &current_json_key) {
                    if let Some(Value::List(items)) = map.get_mut(key) {
                        items.push(Value::Map(item));
                    }
                }
            }
            continue;
        }

        if cells.len() >= 3 {
            let field_name = cells[1].trim();
            let value = cells[2].trim();
            if !field_name.is_empty() && !value.is_empty() {
                if let Some(json_path) = mapping.csv_to_json.get(field_name) {
                    if let Some(parsed) = parse_csv_value(value) {
                        let segments = parse_json_path(json_path);
                        set_path(&mut result, &segments, parsed);
                    }
                }
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_manifest_lists_sorted_eval_ids() {
        let file = write_temp("evals:\n  b-house: {}\n  a-house: {}\n", ".yaml");
        let manifest = load_manifest(file.path()).unwrap();
        assert_eq!(manifest.eval_ids(), vec!["a-house".to_string(), "b-house".to_string()]);
    }

    #[test]
    fn test_field_mapping_splits_default_from_categories() {
        let toml = r#"
[tolerances.default]
percent = 0.5
absolute = 0.01

[tolerances.area]
percent = 1.0
absolute = 0.1

[tolerance_categories]
area = ["area", "sq_ft"]

non_extractable_fields = ["project.run_id"]
"#;
        let file = write_temp(toml, ".toml");
        let mapping = load_field_mapping(file.path()).unwrap();
        let tolerances = mapping.to_tolerance_config();
        assert_eq!(tolerances.default.percent, 0.5);
        assert_eq!(tolerances.categories["area"].percent, 1.0);
        assert!(!tolerances.categories.contains_key("default"));
        assert_eq!(tolerances.non_extractable_fields, vec!["project.run_id".to_string()]);
    }

    #[test]
    fn test_ground_truth_parses_simple_key_value() {
        let csv = ",Climate Zone,12,\n,Run Title,Chamberlin Circle,\n";
        let file = write_temp(csv, ".csv");
        let mut mapping = FieldMappingConfig {
            csv_to_json: HashMap::new(),
            array_mappings: HashMap::new(),
            tolerances: HashMap::new(),
            tolerance_categories: HashMap::new(),
            non_extractable_fields: Vec::new(),
        };
        mapping.csv_to_json.insert("Climate Zone".to_string(), "project.climate_zone".to_string());
        mapping.csv_to_json.insert("Run Title".to_string(), "project.run_title".to_string());

        let gt = parse_ground_truth_csv(file.path(), &mapping).unwrap();
        let Value::Map(root) = &gt else { panic!("expected map") };
        let Value::Map(project) = &root["project"] else { panic!("expected project map") };
        assert_eq!(project["climate_zone"].as_f64(), Some(12.0));
        assert_eq!(project["run_title"].as_str(), Some("Chamberlin Circle"));
    }

    #[test]
    fn test_ground_truth_parses_array_section() {
        let csv = ",Walls:,Name,Area,Azimuth\n,,N Wall,200,0\n,,E Wall,150,90\n\n";
        let file = write_temp(csv, ".csv");
        let mut mapping = FieldMappingConfig {
            csv_to_json: HashMap::new(),
            array_mappings: HashMap::new(),
            tolerances: HashMap::new(),
            tolerance_categories: HashMap::new(),
            non_extractable_fields: Vec::new(),
        };
        let mut fields = HashMap::new();
        fields.insert("Name".to_string(), "name".to_string());
        fields.insert("Area".to_string(), "area".to_string());
        fields.insert("Azimuth".to_string(), "azimuth".to_string());
        mapping.array_mappings.insert("walls".to_string(), ArrayMapping { csv_section: "Walls:".to_string(), fields });

        let gt = parse_ground_truth_csv(file.path(), &mapping).unwrap();
        let Value::Map(root) = &gt else { panic!("expected map") };
        let Value::List(walls) = &root["walls"] else { panic!("expected walls list") };
        assert_eq!(walls.len(), 2);
        let Value::Map(first) = &walls[0] else { panic!("expected map entry") };
        assert_eq!(first["name"].as_str(), Some("N Wall"));
        assert_eq!(first["area"].as_f64(), Some(200.0));
    }
}
