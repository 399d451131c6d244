use serde_json::{Map, Value};

/// Canonical JSON bytes: object keys sorted lexicographically at every depth,
/// arrays in their original order, no insignificant whitespace.
pub fn canonical_json_bytes(value: &Value) -> anyhow::Result<Vec<u8>> {
    let sorted = sort_value(value);
    Ok(serde_json::to_vec(&sorted)?)
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), sort_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}
