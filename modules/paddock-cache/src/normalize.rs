// Store-side value model and the JSON <-> store conversion.
//
// The backing store keeps numbers as decimal strings. Every number is written
// with serde_json's own formatting (shortest round-trip for floats) and read
// back as i64, then u64, then f64, so a payload survives the trip exactly.
// This conversion runs at the cache boundary only.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::error::{CacheError, Result};

/// A value as the backing store holds it. Mirrors DynamoDB's attribute
/// types that JSON payloads need.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    S(String),
    /// Decimal string.
    N(String),
    Bool(bool),
    Null,
    L(Vec<StoredValue>),
    M(BTreeMap<String, StoredValue>),
}

impl StoredValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StoredValue::N(n) => n.parse().ok(),
            _ => None,
        }
    }
}

pub fn normalize(value: &Value) -> StoredValue {
    match value {
        Value::Null => StoredValue::Null,
        Value::Bool(b) => StoredValue::Bool(*b),
        Value::Number(n) => StoredValue::N(n.to_string()),
        Value::String(s) => StoredValue::S(s.clone()),
        Value::Array(items) => StoredValue::L(items.iter().map(normalize).collect()),
        Value::Object(fields) => StoredValue::M(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
    }
}

pub fn denormalize(value: &StoredValue) -> Result<Value> {
    Ok(match value {
        StoredValue::Null => Value::Null,
        StoredValue::Bool(b) => Value::Bool(*b),
        StoredValue::N(n) => Value::Number(parse_number(n)?),
        StoredValue::S(s) => Value::String(s.clone()),
        StoredValue::L(items) => Value::Array(items.iter().map(denormalize).collect::<Result<_>>()?),
        StoredValue::M(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k.clone(), denormalize(v)?);
            }
            Value::Object(map)
        }
    })
}

fn parse_number(raw: &str) -> Result<Number> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Number::from(u));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| CacheError::Malformed(format!("not a number: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_survives_exactly() {
        let payload = json!({
            "jockey_id": "01126",
            "overall": {"wins": 2000, "total_races": 10000, "win_rate": 20.0, "place_rate": 35.1},
            "recent_window": {"win_rate": 33.3, "show_rate": 0.1},
            "tiny": 1.0e-7,
            "big": u64::MAX,
            "negative": -999,
            "flags": [true, false, null],
            "name": "川田 将雅",
        });
        let back = denormalize(&normalize(&payload)).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn floats_are_written_as_decimal_strings() {
        assert_eq!(normalize(&json!(15.5)), StoredValue::N("15.5".into()));
        assert_eq!(normalize(&json!(999)), StoredValue::N("999".into()));
    }

    #[test]
    fn store_canonicalized_integers_still_deserialize_as_floats() {
        // A store may hand back "20" for a float written as "20.0".
        let v = denormalize(&StoredValue::N("20".into())).unwrap();
        let rate: f64 = serde_json::from_value(v).unwrap();
        assert_eq!(rate, 20.0);
    }

    #[test]
    fn garbage_number_is_malformed() {
        assert!(matches!(
            denormalize(&StoredValue::N("twelve".into())),
            Err(CacheError::Malformed(_))
        ));
        assert!(denormalize(&StoredValue::N("NaN".into())).is_err());
    }
}
