//! Destination resolution.
//!
//! Destinations come from two places: label-selector based default
//! subscriptions in the settings, and subscriptions a resource declares in its
//! own annotations. [`resolve_destinations`] merges both and removes
//! duplicates.

pub mod annotations;
pub mod resolver;
pub mod selector;

pub use annotations::{AnnotationSubscription, SubscriptionAnnotations, subscribe_annotation_key};
pub use resolver::{global_destinations, resolve_destinations};
pub use selector::{LabelSelector, SelectorError};

use crate::models::{Destination, SubscriptionSpec};

/// A default subscription with its selector parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Destinations notified.
    pub recipients: Vec<Destination>,
    /// Triggers the subscription applies to; empty means the default
    /// triggers.
    pub triggers: Vec<String>,
    /// Resources the subscription applies to.
    pub selector: LabelSelector,
}

impl Subscription {
    /// Parses the selector and recipients of `spec`.
    pub fn from_spec(spec: &SubscriptionSpec) -> Result<Self, SelectorError> {
        Ok(Self {
            recipients: spec.recipients.iter().map(|r| Destination::parse(r)).collect(),
            triggers: spec.triggers.clone(),
            selector: LabelSelector::parse(&spec.selector)?,
        })
    }

    /// Whether the subscription applies to `trigger`.
    pub fn matches_trigger(&self, trigger: &str) -> bool {
        self.triggers.is_empty() || self.triggers.iter().any(|t| t == trigger)
    }
}
