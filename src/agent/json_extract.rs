//! JSON extraction from free-form agent replies, and the
//! load-bearing manual field-by-field regex repair for replies that
//! violate strict JSON escaping (agents routinely emit raw newlines inside
//! string values, which no JSON parser accepts). Shared by the agent runner
//! and the improvement loop's proposal parser.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

fn try_whole_reply(reply: &str) -> Option<Value> {
    serde_json::from_str(reply.trim()).ok()
}

fn try_fenced_code_block(reply: &str) -> Option<Value> {
    let re = Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)```").ok()?;
    let captured = re.captures(reply)?.get(1)?.as_str();
    serde_json::from_str(captured.trim()).ok()
}

fn try_brace_substring(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// JSON-extraction precedence chain: (a) the whole reply
/// parses as JSON; (b) the first fenced code block parses; (c) the
/// substring from the first `{` to the last `}` parses. Raises a parse
/// failure if none succeed — callers fall back to `extract_fields_manual`
/// for a lenient, field-scoped recovery.
pub fn extract_json_object(reply: &str) -> Result<Value> {
    try_whole_reply(reply)
        .or_else(|| try_fenced_code_block(reply))
        .or_else(|| try_brace_substring(reply))
        .ok_or_else(|| Error::JsonExtractionFailed(reply.chars().take(200).collect()))
}

/// Extracts a text field's value starting after `"field": "`, tolerating
/// unescaped newlines and raw (non-`\"`-escaped) characters in the body.
/// Ends at the first unescaped quote that is immediately followed by a
/// comma or closing brace (after trimming whitespace); falls back to
/// ending at the next `"field":` marker if no clean end is found. Ported
/// from the source's `_parse_proposal_manual.extract_text_field`.
fn extract_text_field(field_name: &str, text: &str) -> Option<String> {
    let start_re = Regex::new(&format!(r#""{}"\s*:\s*""#, regex::escape(field_name))).ok()?;
    let m = start_re.find(text)?;
    let body = &text[m.end()..];
    let chars: Vec<char> = body.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '"' && (i == 0 || chars[i - 1] != '\\') {
            let rest: String = chars[i + 1..].iter().collect();
            let rest = rest.trim_start();
            if rest.starts_with(',') || rest.starts_with('}') {
                return Some(chars[..i].iter().collect());
            }
        }
        i += 1;
    }

    let next_field_re = Regex::new(r#"",\s*"[a-z_]+"\s*:"#).ok()?;
    if let Some(next) = next_field_re.find(body) {
        return Some(body[..next.start()].to_string());
    }
    None
}

/// Manual field-by-field regex repair for malformed JSON objects embedded
/// in free text. `simple_fields` are plain quoted scalars (`"key": "value"`
/// with no internal quotes); `text_fields` may contain raw newlines or
/// unescaped characters and use `extract_text_field`'s quote-scanning.
pub fn extract_fields_manual(text: &str, simple_fields: &[&str], text_fields: &[&str]) -> HashMap<String, String> {
    let mut result = HashMap::new();

    for field in simple_fields {
        if let Ok(re) = Regex::new(&format!(r#""{}"\s*:\s*"([^"]*)""#, regex::escape(field))) {
            if let Some(caps) = re.captures(text) {
                result.insert(field.to_string(), caps[1].to_string());
            }
        }
    }

    for field in text_fields {
        if let Some(value) = extract_text_field(field, text) {
            result.insert(field.to_string(), value);
        }
    }

    result
}
