use std::{
    collections::BTreeMap,
    sync::LazyLock,
};

use regex::{Captures, Regex};
use serde_json::Value;

static SECRET_REF: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\$[\w-]+"));

/// Replaces `$name` references in every string of `definition` with the
/// matching value of `secrets`. Unknown references are left as written.
pub fn substitute_secrets(definition: &Value, secrets: &BTreeMap<String, String>) -> Value {
    let Ok(pattern) = SECRET_REF.as_ref() else {
        return definition.clone();
    };
    substitute(definition, secrets, pattern)
}

fn substitute(value: &Value, secrets: &BTreeMap<String, String>, pattern: &Regex) -> Value {
    match value {
        Value::String(text) => Value::String(
            pattern
                .replace_all(text, |caps: &Captures| {
                    let reference = &caps[0];
                    match secrets.get(&reference[1..]) {
                        Some(secret) => secret.clone(),
                        None => {
                            tracing::warn!(reference, "Secret is not defined");
                            reference.to_string()
                        }
                    }
                })
                .into_owned(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| substitute(item, secrets, pattern)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), substitute(v, secrets, pattern))).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_substitutes_nested_strings() {
        let secrets = BTreeMap::from([
            ("slack-token".to_string(), "xoxb-1".to_string()),
            ("user".to_string(), "bot".to_string()),
        ]);
        let definition = json!({
            "type": "slack",
            "token": "$slack-token",
            "headers": [{ "name": "X-User", "value": "name=$user;" }],
            "port": 8080
        });

        assert_eq!(
            substitute_secrets(&definition, &secrets),
            json!({
                "type": "slack",
                "token": "xoxb-1",
                "headers": [{ "name": "X-User", "value": "name=bot;" }],
                "port": 8080
            })
        );
    }

    #[test]
    fn test_unknown_secret_is_kept() {
        let definition = json!({ "token": "$missing" });
        assert_eq!(substitute_secrets(&definition, &BTreeMap::new()), definition);
    }
}
