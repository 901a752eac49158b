//! Conversions between JSON values and Rhai values.

use rhai::{Array, Dynamic, Map, Scope};
use serde_json::Value;

/// Converts a JSON value into a Rhai value.
///
/// Objects become object maps and arrays become arrays, so expressions can use
/// plain property access (`app.status.sync.status`). Integers that do not fit
/// an `i64` are carried as floats.
pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from_int(i),
            None => Dynamic::from_float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            Dynamic::from_array(items.iter().map(json_to_dynamic).collect::<Array>())
        }
        Value::Object(fields) => {
            let map: Map =
                fields.iter().map(|(k, v)| (k.as_str().into(), json_to_dynamic(v))).collect();
            Dynamic::from_map(map)
        }
    }
}

/// Builds an evaluation scope with every top-level binding pushed as a
/// constant.
pub fn scope_from_vars(vars: &serde_json::Map<String, Value>) -> Scope<'static> {
    let mut scope = Scope::new();
    for (name, value) in vars {
        scope.push_constant_dynamic(name.as_str(), json_to_dynamic(value));
    }
    scope
}

/// Renders an evaluation result as text. Unit becomes the empty string and
/// strings are returned without quotes.
pub fn dynamic_to_string(value: Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if value.is_string() {
        return value.into_string().unwrap_or_default();
    }
    value.to_string()
}
