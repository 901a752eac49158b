//! Label selectors in the Kubernetes syntax.
//!
//! Supported requirements, separated by commas:
//! `key`, `!key`, `key=value`, `key==value`, `key!=value`,
//! `key in (a, b)` and `key notin (a, b)`.

use std::{collections::BTreeMap, fmt};

use thiserror::Error;

/// Errors raised while parsing a selector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// A requirement could not be parsed.
    #[error("invalid selector requirement '{0}'")]
    InvalidRequirement(String),

    /// A label key is empty or contains forbidden characters.
    #[error("invalid label key '{0}'")]
    InvalidKey(String),

    /// A set based requirement has no closing parenthesis.
    #[error("unterminated value set in '{0}'")]
    UnterminatedSet(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Exists(String),
    NotExists(String),
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::NotExists(key) => !labels.contains_key(key),
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Exists(key) => write!(f, "{key}"),
            Requirement::NotExists(key) => write!(f, "!{key}"),
            Requirement::Equals(key, value) => write!(f, "{key}={value}"),
            Requirement::NotEquals(key, value) => write!(f, "{key}!={value}"),
            Requirement::In(key, values) => write!(f, "{key} in ({})", values.join(",")),
            Requirement::NotIn(key, values) => write!(f, "{key} notin ({})", values.join(",")),
        }
    }
}

/// A parsed label selector. The empty selector matches every label set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

fn validate_key(key: &str) -> Result<String, SelectorError> {
    let valid = !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid { Ok(key.to_string()) } else { Err(SelectorError::InvalidKey(key.to_string())) }
}

/// Splits on commas that are not inside a value set.
fn split_requirements(input: &str) -> Result<Vec<&str>, SelectorError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorError::InvalidRequirement(input.to_string()))?
            }
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorError::UnterminatedSet(input.to_string()));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn parse_set(raw: &str, values: &str) -> Result<Vec<String>, SelectorError> {
    let inner = values
        .trim()
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| SelectorError::UnterminatedSet(raw.to_string()))?;
    Ok(inner.split(',').map(str::trim).filter(|v| !v.is_empty()).map(String::from).collect())
}

fn parse_requirement(raw: &str) -> Result<Requirement, SelectorError> {
    let requirement = raw.trim();
    if requirement.is_empty() {
        return Err(SelectorError::InvalidRequirement(raw.to_string()));
    }

    if let Some((key, values)) = requirement.split_once(" notin ") {
        return Ok(Requirement::NotIn(validate_key(key.trim())?, parse_set(raw, values)?));
    }
    if let Some((key, values)) = requirement.split_once(" in ") {
        return Ok(Requirement::In(validate_key(key.trim())?, parse_set(raw, values)?));
    }
    if let Some((key, value)) = requirement.split_once("!=") {
        return Ok(Requirement::NotEquals(validate_key(key.trim())?, value.trim().to_string()));
    }
    if let Some((key, value)) = requirement.split_once("==").or_else(|| requirement.split_once('=')) {
        return Ok(Requirement::Equals(validate_key(key.trim())?, value.trim().to_string()));
    }
    if let Some(key) = requirement.strip_prefix('!') {
        return Ok(Requirement::NotExists(validate_key(key.trim())?));
    }
    Ok(Requirement::Exists(validate_key(requirement)?))
}

impl LabelSelector {
    /// Parses `input`; a blank string yields the match-everything selector.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let requirements =
            split_requirements(input)?.into_iter().map(parse_requirement).collect::<Result<_, _>>()?;
        Ok(Self { requirements })
    }

    /// Whether every requirement holds for `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|requirement| requirement.matches(labels))
    }

    /// Whether the selector matches everything.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}
