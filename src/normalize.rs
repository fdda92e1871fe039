// src/normalize.rs
// Selection normalizer: coerces loosely-shaped LLM output into a validated
// list of selection records. The model does not reliably name its top-level
// array or fully populate every object, so this is the one place in the
// pipeline that absorbs that drift.

use serde_json::Value;

use crate::error::NormalizeError;

/// Key names the model has been observed to use for the selection array,
/// probed in priority order.
const CANDIDATE_KEYS: &[&str] = &[
    "selections",
    "selected_articles",
    "articles",
    "news",
    "selected_news",
    "items",
    "results",
];

const DEFAULT_REASON: &str = "未提供理由";
const DEFAULT_WRITING_DIRECTION: &str = "未提供建議";

/// One validated selection. All fields are free text; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SelectionRecord {
    pub title: String,
    pub reason: String,
    pub writing_direction: String,
}

/// Parse the provider's raw text at the boundary. Invalid JSON and
/// non-object payloads both collapse into the malformed-input path.
pub fn parse_raw_response(raw: &str) -> Result<Value, NormalizeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| NormalizeError::MalformedInput(e.to_string()))?;
    if !value.is_object() {
        return Err(NormalizeError::MalformedInput(format!(
            "expected object, got {}",
            json_type_name(&value)
        )));
    }
    Ok(value)
}

/// Transform an untyped mapping into a validated selection batch.
///
/// Resolution order:
/// 1. first candidate key whose value is an array;
/// 2. fallback scan over all entries in source order for a non-empty array
///    whose first element is an object carrying `title` or `reason`;
/// 3. otherwise the payload is rejected outright.
///
/// A located-but-empty array is a hard failure. Non-object elements are
/// dropped silently; missing fields are filled with fixed placeholders.
/// The batch length is whatever survived: the "exactly five" contract is a
/// prompt-level request to the model, not enforced here.
pub fn normalize_selection(value: &Value) -> Result<Vec<SelectionRecord>, NormalizeError> {
    let map = value.as_object().ok_or_else(|| {
        NormalizeError::MalformedInput(format!("expected object, got {}", json_type_name(value)))
    })?;

    let candidate = CANDIDATE_KEYS
        .iter()
        .find_map(|key| {
            let arr = map.get(*key)?.as_array()?;
            tracing::debug!(key = *key, "selection array under candidate key");
            Some(arr)
        })
        .or_else(|| {
            map.iter().find_map(|(key, v)| {
                let arr = v.as_array()?;
                let first = arr.first()?.as_object()?;
                if first.contains_key("title") || first.contains_key("reason") {
                    tracing::debug!(key = key.as_str(), "selection array via fallback scan");
                    Some(arr)
                } else {
                    None
                }
            })
        })
        .ok_or(NormalizeError::NoSelectionArray)?;

    if candidate.is_empty() {
        return Err(NormalizeError::EmptySelection);
    }

    let records = candidate
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let obj = item.as_object()?;
            Some(SelectionRecord {
                title: field_or(obj, "title", &format!("新聞 {}", i + 1)),
                reason: field_or(obj, "reason", DEFAULT_REASON),
                writing_direction: field_or(obj, "writing_direction", DEFAULT_WRITING_DIRECTION),
            })
        })
        .collect();

    Ok(records)
}

/// End-to-end convenience: raw provider text to validated batch.
pub fn normalize_raw(raw: &str) -> Result<Vec<SelectionRecord>, NormalizeError> {
    normalize_selection(&parse_raw_response(raw)?)
}

fn field_or(obj: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => default.to_string(),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
