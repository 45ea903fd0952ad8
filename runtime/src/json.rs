//! JSON encode/decode over the value model.
//!
//! Decoded numbers land on the integer payload (truncated); dicts may
//! reorder keys on a round-trip, strings round-trip bytewise.

use serde_json::{Map, Number};

use crate::value::{alloc, get, Dict, Value};

fn to_json(value: *mut Value) -> serde_json::Value {
    match get(value) {
        Value::Int(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|item| to_json(*item)).collect())
        }
        Value::Dict(pairs) => json_object(pairs),
        Value::Struct { fields, .. } => json_object(fields),
        Value::Function(_) | Value::Null => serde_json::Value::Null,
    }
}

fn json_object(pairs: &Dict) -> serde_json::Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.clone(), to_json(*value));
    }
    serde_json::Value::Object(map)
}

fn from_json(value: &serde_json::Value) -> *mut Value {
    match value {
        serde_json::Value::Null => alloc(Value::Null),
        serde_json::Value::Bool(b) => alloc(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            let int = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(0);
            alloc(Value::Int(int))
        }
        serde_json::Value::String(s) => alloc(Value::Str(s.clone())),
        serde_json::Value::Array(items) => {
            alloc(Value::Array(items.iter().map(from_json).collect()))
        }
        serde_json::Value::Object(map) => {
            let pairs: Dict = map
                .iter()
                .map(|(key, value)| (key.clone(), from_json(value)))
                .collect();
            alloc(Value::Dict(pairs))
        }
    }
}

#[no_mangle]
pub extern "C" fn json_encode(value: *mut Value) -> *mut Value {
    alloc(Value::Str(to_json(value).to_string()))
}

#[no_mangle]
pub extern "C" fn json_decode(text: *mut Value) -> *mut Value {
    match serde_json::from_str::<serde_json::Value>(&crate::value::text_of(text)) {
        Ok(parsed) => from_json(&parsed),
        Err(_) => alloc(Value::Null),
    }
}
