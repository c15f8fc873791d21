//! Response-shape normalization.
//!
//! Creation endpoints return one of: a bare object, `{item: …}`,
//! `{data: …}`, `{result: …}`, a step-specific wrapper, or an
//! execution-specific wrapper; list endpoints return either an array under
//! `items` or a map keyed by string identifiers. This module absorbs all of
//! them behind one ordered-attempt algorithm.

use serde_json::Value;

use super::id::{coerce_id, is_placeholder};
use crate::error::{ClientError, ClientResult, ErrorContext, ErrorKind};
use crate::model::ResourceId;

/// Wrapper keys probed, in order, for a nested identifier.
const WRAPPER_KEYS: &[&str] = &["item", "data", "result", "step", "testStep", "execution"];

/// Flat alternate identifier field names.
const FLAT_ID_KEYS: &[&str] = &["stepId", "executionId", "testStepId"];

/// Keys probed for the payload of a list response.
const LIST_KEYS: &[&str] = &["items", "data", "result", "list"];

/// Outcome of identifier extraction.
///
/// `Placeholder` and `NoIdSuccess` are successes, not errors: callers log
/// and continue, but must never store the sentinel as a real reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Id(ResourceId),
    /// The API echoed a sentinel (0 or 1); the command has no
    /// independently addressable remote identity.
    Placeholder(i64),
    /// No identifier anywhere, but the payload carries an explicit success
    /// indicator.
    NoIdSuccess,
}

impl Extraction {
    /// The extracted identifier, if it is trustworthy as a reference.
    pub fn id(&self) -> Option<&ResourceId> {
        match self {
            Extraction::Id(id) => Some(id),
            _ => None,
        }
    }
}

/// Extract a canonical identifier from raw response bytes, regardless of
/// response shape.
pub fn extract_id(raw: &[u8]) -> ClientResult<Extraction> {
    let root: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        // Structured parsing failed entirely: last-resort token scan.
        Err(_) => return fallback_extract(raw),
    };

    // Some endpoints return the identifier bare, not wrapped in an object.
    if let Value::Number(_) | Value::String(_) = root {
        if let Some(id) = coerce_id(&root) {
            return Ok(classify(id));
        }
    }

    let mut placeholder_seen: Option<i64> = None;
    for candidate in candidates(&root) {
        match coerce_id(candidate) {
            None => {}
            Some(ResourceId::Num(n)) if is_placeholder(n) => {
                // Remember the sentinel but keep probing: a later location
                // may hold the real identifier.
                placeholder_seen.get_or_insert(n);
            }
            Some(id) => return Ok(Extraction::Id(id)),
        }
    }

    if let Some(n) = placeholder_seen {
        return Ok(Extraction::Placeholder(n));
    }

    if let Some((code, message)) = api_error(&root) {
        return Err(ClientError::Api {
            code,
            status: 200,
            message: message.clone(),
            context: ErrorContext::non_retryable(ErrorKind::Validation, message),
        });
    }

    if success_indicated(&root) {
        return Ok(Extraction::NoIdSuccess);
    }

    Err(invalid_response(raw))
}

/// Ordered candidate locations for the identifier.
fn candidates(root: &Value) -> impl Iterator<Item = &Value> {
    let direct = root.get("id").into_iter();
    let wrapped = WRAPPER_KEYS
        .iter()
        .filter_map(|w| root.get(w).and_then(|inner| inner.get("id")));
    let flat = FLAT_ID_KEYS.iter().filter_map(|k| root.get(k));
    let wrapped_flat = WRAPPER_KEYS.iter().flat_map(move |w| {
        FLAT_ID_KEYS
            .iter()
            .filter_map(move |k| root.get(w).and_then(|inner| inner.get(k)))
    });
    direct.chain(wrapped).chain(flat).chain(wrapped_flat)
}

/// An explicit API error field or message, if the payload carries one.
fn api_error(root: &Value) -> Option<(Option<String>, String)> {
    match root.get("error") {
        Some(Value::String(msg)) if !msg.is_empty() => return Some((None, msg.clone())),
        Some(Value::Object(obj)) => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified API error")
                .to_string();
            let code = obj.get("code").map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            return Some((code, message));
        }
        _ => {}
    }

    let failed = root.get("success") == Some(&Value::Bool(false))
        || root
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case("error") || s.eq_ignore_ascii_case("failed"));
    if failed {
        let message = root
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("remote reported failure")
            .to_string();
        return Some((None, message));
    }

    None
}

/// Boolean-true or a status string in {success, ok}.
fn success_indicated(root: &Value) -> bool {
    if root.get("success") == Some(&Value::Bool(true)) {
        return true;
    }
    for key in ["status", "outcome"] {
        if let Some(s) = root.get(key).and_then(Value::as_str) {
            if s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("ok") {
                return true;
            }
        }
    }
    false
}

fn classify(id: ResourceId) -> Extraction {
    match id {
        ResourceId::Num(n) if is_placeholder(n) => Extraction::Placeholder(n),
        other => Extraction::Id(other),
    }
}

/// Pattern scan over the raw bytes for an `"id": <number>` token. Signals a
/// response shape not yet modeled, hence the WARN.
fn fallback_extract(raw: &[u8]) -> ClientResult<Extraction> {
    let text = String::from_utf8_lossy(raw);
    let re = regex::Regex::new(r#""id"\s*:\s*"?(-?\d+)"?"#).expect("fallback pattern is valid");
    if let Some(caps) = re.captures(&text) {
        if let Ok(n) = caps[1].parse::<i64>() {
            tracing::warn!(id = n, "identifier recovered via raw token scan; unmodeled response shape");
            return Ok(classify(ResourceId::Num(n)));
        }
    }
    Err(invalid_response(raw))
}

fn invalid_response(raw: &[u8]) -> ClientError {
    ClientError::protocol(
        "no identifier, success indicator, or error field in response",
        String::from_utf8_lossy(raw).into_owned(),
    )
}

/// Normalize a list payload to a vector of item objects.
///
/// Handles a bare array, an array under a wrapper key, and a map keyed by
/// string identifiers (under a wrapper or at the root). Map entries are
/// ordered by ascending canonical key id so downstream discovery predicates
/// are deterministic.
pub fn normalize_list(raw: &[u8]) -> ClientResult<Vec<Value>> {
    let root: Value = serde_json::from_slice(raw)
        .map_err(|e| ClientError::protocol(
            format!("list response is not JSON: {}", e),
            String::from_utf8_lossy(raw).into_owned(),
        ))?;

    if let Some((code, message)) = api_error(&root) {
        return Err(ClientError::Api {
            code,
            status: 200,
            message: message.clone(),
            context: ErrorContext::non_retryable(ErrorKind::Validation, message),
        });
    }

    if let Value::Array(items) = &root {
        return Ok(items.clone());
    }

    for key in LIST_KEYS {
        match root.get(key) {
            Some(Value::Array(items)) => return Ok(items.clone()),
            Some(Value::Object(map)) => return Ok(map_values_by_id(map)),
            _ => {}
        }
    }

    // Map keyed by ids at the root.
    if let Value::Object(map) = &root {
        if !map.is_empty() && map.values().all(Value::is_object) {
            return Ok(map_values_by_id(map));
        }
        if map.is_empty() {
            return Ok(Vec::new());
        }
    }

    Err(ClientError::protocol(
        "list response matches no known shape",
        root.to_string(),
    ))
}

fn map_values_by_id(map: &serde_json::Map<String, Value>) -> Vec<Value> {
    let mut entries: Vec<(ResourceId, Value)> = map
        .iter()
        .map(|(k, v)| {
            let key = coerce_id(&Value::String(k.clone()))
                .unwrap_or_else(|| ResourceId::Tag(k.clone()));
            (key, v.clone())
        })
        .collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries.into_iter().map(|(_, v)| v).collect()
}
