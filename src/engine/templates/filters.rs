//! This module provides custom filters and functions for the minijinja
//! templating engine

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{
    Error, ErrorKind, State,
    value::{Value, ValueKind},
};
use rust_decimal::{Decimal, MathematicalOps};

use crate::engine::git_url;

/// Default output format of the `date` filter.
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// A minijinja filter that sums a sequence of string-represented decimal
/// numbers.
pub fn sum(values: Value) -> Result<String, Error> {
    if values.kind() != ValueKind::Seq {
        return Err(invalid("sum filter can only be applied to a sequence."));
    }

    let mut total = Decimal::ZERO;
    for value in values.try_iter()? {
        let s = value.to_string();
        let num = Decimal::from_str(&s)
            .map_err(|e| invalid(format!("Failed to parse value for sum: {s} ({e})")))?;
        total += num;
    }

    Ok(total.to_string())
}

/// A minijinja filter that averages a sequence of string-represented decimal
/// numbers.
pub fn avg(values: Value) -> Result<String, Error> {
    if values.kind() != ValueKind::Seq {
        return Err(invalid("avg filter can only be applied to a sequence."));
    }

    let mut total = Decimal::ZERO;
    let mut count = 0;
    for value in values.try_iter()? {
        let s = value.to_string();
        let num = Decimal::from_str(&s)
            .map_err(|e| invalid(format!("Failed to parse value for avg: {s} ({e})")))?;
        total += num;
        count += 1;
    }

    if count == 0 {
        return Ok(Decimal::ZERO.to_string());
    }

    Ok((total / Decimal::from(count)).to_string())
}

/// A minijinja filter that scales an integer amount down by a number of
/// decimals.
///
/// ```jinja
/// {{ app.status.resources_cost | decimals(2) }}
/// ```
pub fn decimals(_state: &State, value: String, decimals: u32) -> Result<String, Error> {
    let amount =
        Decimal::from_str(&value).map_err(|e| invalid(format!("Failed to parse amount: {e}")))?;

    Ok(scale_by_decimals(amount, decimals))
}

/// Cuts a string to at most `length` characters.
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

/// Wraps a value in double quotes, escaping it as a JSON string.
pub fn quote(value: Value) -> Result<String, Error> {
    let text = if value.is_undefined() || value.is_none() { String::new() } else { value.to_string() };
    serde_json::to_string(&text).map_err(|e| invalid(format!("Failed to quote value: {e}")))
}

/// A minijinja filter that rewrites a git repository URL as `https://`.
///
/// ```jinja
/// {{ app.spec.source.repoURL | repo_url_to_https }}
/// ```
pub fn repo_url_to_https(value: String) -> Result<String, Error> {
    git_url::to_https(&value).map_err(|e| invalid(e.to_string()))
}

/// A minijinja filter that extracts `owner/name` from a git repository URL.
pub fn full_name_by_repo_url(value: String) -> Result<String, Error> {
    git_url::full_name(&value).map_err(|e| invalid(e.to_string()))
}

/// Formats an RFC 3339 timestamp or Unix seconds with a `strftime` pattern.
///
/// ```jinja
/// {{ app.status.operationState.finishedAt | date("%H:%M") }}
/// ```
pub fn date(value: Value, format: Option<String>) -> Result<String, Error> {
    let timestamp: DateTime<Utc> = match value.kind() {
        ValueKind::Number => {
            let seconds = i64::try_from(value.clone())
                .map_err(|e| invalid(format!("Failed to read timestamp {value}: {e}")))?;
            DateTime::from_timestamp(seconds, 0)
                .ok_or_else(|| invalid(format!("Timestamp out of range: {seconds}")))?
        }
        ValueKind::String => {
            let raw = value.to_string();
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| invalid(format!("Failed to parse date '{raw}': {e}")))?
                .with_timezone(&Utc)
        }
        _ => return Err(invalid(format!("date filter cannot format {value}"))),
    };

    Ok(timestamp.format(format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT)).to_string())
}

/// Global `now()` function: the current time in RFC 3339.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Scales a Decimal value by a given number of decimals and returns it as a
/// formatted string. Trailing zeros are trimmed.
fn scale_by_decimals(amount: Decimal, decimals: u32) -> String {
    let scaling_factor = Decimal::from(10).powi(decimals.into());
    let scaled_amount = amount / scaling_factor;

    scaled_amount.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use minijinja::Environment;

    use super::*;

    #[test]
    fn test_sum_filter() {
        let values = Value::from_serialize(vec!["1000", "2000", "3000.5"]);
        assert_eq!(sum(values).unwrap(), "6000.5");
        assert!(sum(Value::from("10")).is_err());
    }

    #[test]
    fn test_avg_filter() {
        let values = Value::from_serialize(vec!["10", "20", "30"]);
        assert_eq!(avg(values).unwrap(), "20");
        assert_eq!(avg(Value::from_serialize(Vec::<String>::new())).unwrap(), "0");
    }

    #[test]
    fn test_decimals() {
        let env = Environment::new();
        let state = env.empty_state();
        assert_eq!(decimals(&state, "12345".to_string(), 2).unwrap(), "123.45");
        assert!(decimals(&state, "abc".to_string(), 2).is_err());
    }

    #[test]
    fn test_trunc_and_quote() {
        assert_eq!(trunc("abcdef".into(), 3), "abc");
        assert_eq!(trunc("ab".into(), 3), "ab");
        assert_eq!(quote(Value::from("say \"hi\"")).unwrap(), r#""say \"hi\"""#);
        assert_eq!(quote(Value::UNDEFINED).unwrap(), r#""""#);
    }

    #[test]
    fn test_repo_filters() {
        assert_eq!(
            repo_url_to_https("git@github.com:argoproj/argo-cd.git".into()).unwrap(),
            "https://github.com/argoproj/argo-cd.git"
        );
        assert_eq!(
            full_name_by_repo_url("https://github.com/argoproj/argo-cd.git".into()).unwrap(),
            "argoproj/argo-cd"
        );
        assert!(full_name_by_repo_url("nope".into()).is_err());
    }

    #[test]
    fn test_date() {
        assert_eq!(
            date(Value::from("2024-01-01T10:30:00+02:00"), None).unwrap(),
            "2024-01-01 08:30:00 UTC"
        );
        assert_eq!(date(Value::from(1_704_067_200), Some("%Y-%m-%d".into())).unwrap(), "2024-01-01");
        assert!(date(Value::from("yesterday"), None).is_err());
        assert!(date(Value::from(true), None).is_err());
    }

    #[test]
    fn test_now_is_rfc3339() {
        assert!(DateTime::parse_from_rfc3339(&now()).is_ok());
    }
}
