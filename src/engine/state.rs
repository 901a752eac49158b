//! Per-resource record of which destinations were already notified.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{ConditionResult, Destination};

/// State key of a condition/destination pair:
/// `[<oncePer>:]<trigger>:<condition key>:<service>:<recipient>`.
pub fn state_item_key(trigger: &str, result: &ConditionResult, destination: &Destination) -> String {
    let key = format!("{trigger}:{}:{}:{}", result.key, destination.service, destination.recipient);
    if result.once_per.is_empty() { key } else { format!("{}:{key}", result.once_per) }
}

/// Map of state key to the Unix timestamp of the notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationsState(BTreeMap<String, i64>);

impl NotificationsState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the persisted annotation value. Anything that is not a JSON
    /// object of integers yields an empty state.
    pub fn from_persisted(value: Option<&str>) -> Self {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return Self::new();
        };
        serde_json::from_str(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable notification state");
            Self::new()
        })
    }

    /// Serializes the state for persistence.
    pub fn to_persisted(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Records (`notified == true`) or clears the notification of
    /// `destination` for a condition, returning whether the state changed.
    ///
    /// Records with a grouping value are never cleared: they only stop
    /// matching once the grouping value changes.
    pub fn set_already_notified(
        &mut self,
        trigger: &str,
        result: &ConditionResult,
        destination: &Destination,
        notified: bool,
    ) -> bool {
        self.set_already_notified_at(trigger, result, destination, notified, Utc::now().timestamp())
    }

    /// [`Self::set_already_notified`] with an explicit timestamp.
    pub fn set_already_notified_at(
        &mut self,
        trigger: &str,
        result: &ConditionResult,
        destination: &Destination,
        notified: bool,
        timestamp: i64,
    ) -> bool {
        let key = state_item_key(trigger, result, destination);
        if notified {
            if self.0.contains_key(&key) {
                return false;
            }
            self.0.insert(key, timestamp);
            return true;
        }

        if !result.once_per.is_empty() {
            return false;
        }
        self.0.remove(&key).is_some()
    }

    /// Whether `destination` is recorded as notified for the condition.
    pub fn is_notified(
        &self,
        trigger: &str,
        result: &ConditionResult,
        destination: &Destination,
    ) -> bool {
        self.0.contains_key(&state_item_key(trigger, result, destination))
    }

    /// Drops the oldest records until at most `max_size` remain. Records with
    /// the same timestamp are dropped in key order.
    pub fn truncate(&mut self, max_size: usize) {
        if self.0.len() <= max_size {
            return;
        }
        let mut entries: Vec<(i64, String)> =
            self.0.iter().map(|(key, timestamp)| (*timestamp, key.clone())).collect();
        entries.sort();
        let excess = self.0.len() - max_size;
        for (_, key) in entries.into_iter().take(excess) {
            self.0.remove(&key);
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(state key, timestamp)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }
}
