//! Flattens a `Value` tree into a dotted-path map. List elements use
//! `prefix[i]`; nested maps recurse; scalars and lists-of-scalars
//! terminate. This is a generic tree walker — it never reflects over
//! domain structs directly, only over the common `Value` variant.

use std::collections::BTreeMap;

use crate::model::value::Value;

/// Flattens `value` into `{dotted_path: scalar_or_list_value}` pairs.
/// Deterministic: flatten(x) == flatten(x) for any `x`, since `Value::Map` is a `BTreeMap` and traversal order is fixed.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(value, "", &mut out);
    out
}

fn flatten_into(value: &Value, prefix: &str, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Map(map) => {
            for (key, v) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(v, &path, out);
            }
        }
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                match item {
                    Value::Map(_) | Value::List(_) => flatten_into(item, &path, out),
                    scalar => {
                        out.insert(path, scalar.clone());
                    }
                }
            }
        }
        scalar => {
            // Top-level scalar (empty prefix) has no meaningful path; only
            // reached when flattening a bare scalar directly.
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), scalar.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Value::Map(m)
    }

    #[test]
    fn test_flatten_nested_map() {
        let v = map(vec![("project", map(vec![("name", Value::String("Foo".into()))]))]);
        let flat = flatten(&v);
        assert_eq!(flat.get("project.name").unwrap().as_str(), Some("Foo"));
    }

    #[test]
    fn test_flatten_list_of_maps_uses_index_notation() {
        let v = map(vec![(
            "walls",
            Value::List(vec![
                map(vec![("name", Value::String("N Wall".into()))]),
                map(vec![("name", Value::String("E Wall".into()))]),
            ]),
        )]);
        let flat = flatten(&v);
        assert_eq!(flat.get("walls[0].name").unwrap().as_str(), Some("N Wall"));
        assert_eq!(flat.get("walls[1].name").unwrap().as_str(), Some("E Wall"));
    }

    #[test]
    fn test_flatten_list_of_scalars_terminates_with_index() {
        let v = map(vec![("tags", Value::List(vec![Value::String("a".into()), Value::String("b".into())]))]);
        let flat = flatten(&v);
        assert_eq!(flat.get("tags[0]").unwrap().as_str(), Some("a"));
        assert_eq!(flat.get("tags[1]").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let v = map(vec![("b", Value::Number(2.0)), ("a", Value::Number(1.0))]);
        assert_eq!(flatten(&v), flatten(&v));
    }
}
