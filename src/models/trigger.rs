//! Trigger conditions and their evaluation results.

use serde::{Deserialize, Serialize};

/// One condition of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Boolean expression deciding whether the condition holds.
    pub when: String,

    /// Optional expression whose value groups notifications: once a
    /// destination has been notified for a value, it is not notified again
    /// until the value changes.
    #[serde(default, alias = "oncePer", skip_serializing_if = "Option::is_none")]
    pub once_per: Option<String>,

    /// Human readable description.
    #[serde(default)]
    pub description: String,

    /// Templates rendered, in order, when the condition holds.
    #[serde(default)]
    pub send: Vec<String>,
}

impl Condition {
    /// Creates a condition sending `templates` when `when` holds.
    pub fn new(when: impl Into<String>, templates: &[&str]) -> Self {
        Self {
            when: when.into(),
            once_per: None,
            description: String::new(),
            send: templates.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Sets the grouping expression.
    pub fn with_once_per(mut self, expression: impl Into<String>) -> Self {
        self.once_per = Some(expression.into());
        self
    }
}

/// Outcome of evaluating one condition against a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionResult {
    /// Stable identity of the condition: `[<index>].<hash of when>`.
    pub key: String,
    /// Stringified grouping value, empty when the condition has none.
    pub once_per: String,
    /// Templates to render when triggered.
    pub templates: Vec<String>,
    /// Whether the condition holds.
    pub triggered: bool,
}
