//! The notification settings document, as written by operators.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Condition, TemplateSpec};

/// A default subscription as written in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionSpec {
    /// Recipients in `service:recipient` form.
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Triggers the subscription applies to; empty means the default
    /// triggers.
    #[serde(default)]
    pub triggers: Vec<String>,

    /// Label selector the resource must match; empty matches everything.
    #[serde(default)]
    pub selector: String,
}

/// Raw notification settings.
///
/// This is the serialization boundary of the engine configuration: nothing
/// here is compiled or validated yet. Service definitions stay untyped until
/// secrets have been substituted into them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsSettings {
    /// Trigger name to ordered conditions.
    #[serde(default)]
    pub triggers: BTreeMap<String, Vec<Condition>>,

    /// Template name to template source.
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateSpec>,

    /// Service name to service definition (with a `type` field).
    #[serde(default)]
    pub services: BTreeMap<String, Value>,

    /// Label selector based default subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSpec>,

    /// Triggers applied when a subscription names no trigger.
    #[serde(default, alias = "defaultTriggers")]
    pub default_triggers: Vec<String>,

    /// Per service override of `default_triggers`.
    #[serde(default, alias = "serviceDefaultTriggers")]
    pub service_default_triggers: BTreeMap<String, Vec<String>>,

    /// Values exposed to conditions and templates as `context`.
    #[serde(default)]
    pub context: Map<String, Value>,

    /// Values substituted for `$name` references in service definitions.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}
