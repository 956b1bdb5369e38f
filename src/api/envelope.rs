//! JSON envelopes used by the Lighthouse API.
//!
//! Every request body wraps its payload in an object keyed by the resource's
//! snake-case name (`{"ticket": {...}}`). Collection responses are arrays of
//! such singleton objects (`{"tickets": [{"ticket": {...}}, ...]}`), so each
//! element has to be unwrapped individually.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::error::{ApiError, Result};

/// Wrap `payload` as `{"<key>": payload}`.
pub fn wrap<T: Serialize + ?Sized>(key: &str, payload: &T) -> Result<Value> {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), serde_json::to_value(payload)?);
    Ok(Value::Object(map))
}

/// Decode a singular envelope `{"<key>": {...}}`.
pub fn unwrap_one<T: DeserializeOwned>(key: &str, body: &[u8]) -> Result<T> {
    let value: Value = serde_json::from_slice(body)?;
    take_keyed(key, value)
}

/// Decode a collection envelope `{"<plural>": [{"<key>": {...}}, ...]}`,
/// preserving server order.
pub fn unwrap_many<T: DeserializeOwned>(plural: &str, key: &str, body: &[u8]) -> Result<Vec<T>> {
    let value: Value = serde_json::from_slice(body)?;
    let items = match take_field(plural, value)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(ApiError::Decode(format!(
                "expected array under {:?}, found {}",
                plural,
                kind(&other)
            )))
        }
    };

    items.into_iter().map(|item| take_keyed(key, item)).collect()
}

fn take_keyed<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    let inner = take_field(key, value)?;
    serde_json::from_value(inner).map_err(|e| ApiError::Decode(format!("{}: {}", key, e)))
}

fn take_field(key: &str, value: Value) -> Result<Value> {
    match value {
        Value::Object(mut map) => map
            .remove(key)
            .ok_or_else(|| ApiError::Decode(format!("missing {:?} envelope", key))),
        other => Err(ApiError::Decode(format!(
            "expected object with {:?}, found {}",
            key,
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Numbered {
        number: u64,
    }

    #[test]
    fn test_collection_flattens_in_order() {
        let body = br#"{"tickets":[{"ticket":{"number":1}},{"ticket":{"number":2}}]}"#;
        let items: Vec<Numbered> = unwrap_many("tickets", "ticket", body).unwrap();
        assert_eq!(items, vec![Numbered { number: 1 }, Numbered { number: 2 }]);
    }

    #[test]
    fn test_empty_collection() {
        let items: Vec<Numbered> = unwrap_many("tickets", "ticket", br#"{"tickets":[]}"#).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_collection_missing_key_is_decode_error() {
        let err = unwrap_many::<Numbered>("tickets", "ticket", br#"{"milestones":[]}"#).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_collection_item_without_wrapper_is_rejected() {
        let err = unwrap_many::<Numbered>("tickets", "ticket", br#"{"tickets":[{"number":1}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("ticket"));
    }

    #[test]
    fn test_singular_round_trip() {
        let wrapped = wrap("ticket", &Numbered { number: 7 }).unwrap();
        assert_eq!(wrapped, json!({"ticket": {"number": 7}}));

        let body = serde_json::to_vec(&wrapped).unwrap();
        let decoded: Numbered = unwrap_one("ticket", &body).unwrap();
        assert_eq!(decoded.number, 7);
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = unwrap_one::<Numbered>("ticket", b"not json").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
