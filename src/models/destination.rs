//! Notification destinations and the per-trigger destination map.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use serde::{Deserialize, Serialize};

/// A (service, recipient) pair a notification is delivered to.
///
/// `service` names a configured channel service (e.g. `slack`), `recipient`
/// is interpreted by that service (a channel, an address, or nothing at all
/// for a plain webhook).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination {
    /// Name of the configured channel service.
    pub service: String,
    /// Service specific recipient; may be empty.
    pub recipient: String,
}

impl Destination {
    /// Creates a new destination.
    pub fn new(service: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self { service: service.into(), recipient: recipient.into() }
    }

    /// Parses a `service:recipient` string.
    ///
    /// Only the first `:` separates the two parts, so recipients may contain
    /// colons themselves. A value without a colon names a service with an
    /// empty recipient.
    pub fn parse(value: &str) -> Self {
        match value.trim().split_once(':') {
            Some((service, recipient)) => Self::new(service.trim(), recipient.trim()),
            None => Self::new(value.trim(), ""),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.recipient)
    }
}

/// Destinations grouped by trigger name.
///
/// Triggers iterate in name order and destinations keep their insertion
/// order, so a reconcile pass always walks them in the same sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations(BTreeMap<String, Vec<Destination>>);

impl Destinations {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a destination to a trigger.
    pub fn add(&mut self, trigger: impl Into<String>, destination: Destination) {
        self.0.entry(trigger.into()).or_default().push(destination);
    }

    /// Appends every destination of `other`, trigger by trigger.
    pub fn merge(&mut self, other: Destinations) {
        for (trigger, destinations) in other.0 {
            self.0.entry(trigger).or_default().extend(destinations);
        }
    }

    /// Removes repeated destinations per trigger; the first occurrence keeps
    /// its position.
    pub fn dedup(&mut self) {
        for destinations in self.0.values_mut() {
            let mut seen = HashSet::with_capacity(destinations.len());
            destinations.retain(|destination| seen.insert(destination.clone()));
        }
        self.0.retain(|_, destinations| !destinations.is_empty());
    }

    /// Destinations registered for `trigger`.
    pub fn get(&self, trigger: &str) -> &[Destination] {
        self.0.get(trigger).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates triggers in name order with their destinations.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Destination>)> {
        self.0.iter()
    }

    /// True when no trigger has any destination.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Number of triggers with at least one destination entry.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<BTreeMap<String, Vec<Destination>>> for Destinations {
    fn from(map: BTreeMap<String, Vec<Destination>>) -> Self {
        Self(map)
    }
}
