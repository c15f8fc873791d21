//! Canonical identifier coercion.
//!
//! Numeric fields arrive as JSON numbers, numeric strings, or floating-point
//! representations of integers; all three coerce to one canonical integer.
//! Non-numeric opaque strings (`"exec_123"`) pass through unchanged.

use serde_json::Value;

use crate::model::ResourceId;

/// Sentinel identifiers echoed by commands with no independently
/// addressable remote identity (dialog dismissal, some mouse actions).
pub fn is_placeholder(n: i64) -> bool {
    n == 0 || n == 1
}

/// Coerce a JSON value into a canonical identifier.
///
/// Returns `None` when the field is absent under the normalization rules:
/// null, empty string, or a value that is not id-shaped (booleans, arrays,
/// objects, non-integral floats).
pub fn coerce_id(value: &Value) -> Option<ResourceId> {
    match value {
        Value::Null => None,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(ResourceId::Num(i))
            } else if let Some(u) = n.as_u64() {
                i64::try_from(u).ok().map(ResourceId::Num)
            } else {
                integral_f64(n.as_f64()?)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(i) = s.parse::<i64>() {
                return Some(ResourceId::Num(i));
            }
            if let Ok(f) = s.parse::<f64>() {
                if let Some(id) = integral_f64(f) {
                    return Some(id);
                }
            }
            Some(ResourceId::Tag(s.to_string()))
        }
        _ => None,
    }
}

fn integral_f64(f: f64) -> Option<ResourceId> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(ResourceId::Num(f as i64))
    } else {
        None
    }
}

/// Lenient non-negative count coercion for progress fields, which arrive
/// with the same type looseness as identifiers.
pub fn coerce_count(value: &Value) -> Option<u64> {
    match coerce_id(value)? {
        ResourceId::Num(n) if n >= 0 => Some(n as u64),
        _ => None,
    }
}
