use std::collections::BTreeMap;

use super::{Subscription, SubscriptionAnnotations};
use crate::models::{Destinations, Resource};

/// Destinations of the default subscriptions whose selector matches `labels`.
///
/// A subscription without triggers applies to every trigger of
/// `default_triggers`.
pub fn global_destinations(
    subscriptions: &[Subscription],
    default_triggers: &[String],
    labels: &BTreeMap<String, String>,
) -> Destinations {
    let mut destinations = Destinations::new();
    for subscription in subscriptions {
        if !subscription.selector.matches(labels) {
            continue;
        }
        let triggers = if subscription.triggers.is_empty() {
            default_triggers
        } else {
            subscription.triggers.as_slice()
        };
        for trigger in triggers {
            if !subscription.matches_trigger(trigger) {
                continue;
            }
            for recipient in &subscription.recipients {
                destinations.add(trigger.clone(), recipient.clone());
            }
        }
    }
    destinations
}

/// Every destination of `resource`, per trigger: default subscriptions first,
/// then the resource's annotation subscriptions, without duplicates.
pub fn resolve_destinations(
    resource: &Resource,
    annotation_prefix: &str,
    subscriptions: &[Subscription],
    default_triggers: &[String],
    service_default_triggers: &BTreeMap<String, Vec<String>>,
) -> Destinations {
    let mut destinations = global_destinations(subscriptions, default_triggers, &resource.labels());
    let annotations = SubscriptionAnnotations::new(annotation_prefix, resource.annotations());
    destinations.merge(annotations.destinations(default_triggers, service_default_triggers));
    destinations.dedup();
    destinations
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{Destination, SubscriptionSpec};

    const PREFIX: &str = "notifications.herald.io";

    fn subscription(recipients: &[&str], triggers: &[&str], selector: &str) -> Subscription {
        Subscription::from_spec(&SubscriptionSpec {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            selector: selector.to_string(),
        })
        .unwrap()
    }

    fn resource(labels: serde_json::Value, annotations: serde_json::Value) -> Resource {
        Resource::new(json!({
            "metadata": { "name": "guestbook", "labels": labels, "annotations": annotations }
        }))
    }

    #[test]
    fn test_global_destinations_use_default_triggers() {
        let subscriptions = vec![
            subscription(&["slack:ops"], &[], "env=prod"),
            subscription(&["email:qa@example.com"], &["on-sync-failed"], ""),
        ];
        let defaults = vec!["on-deployed".to_string()];

        let prod = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let destinations = global_destinations(&subscriptions, &defaults, &prod);
        assert_eq!(destinations.get("on-deployed"), &[Destination::new("slack", "ops")]);
        assert_eq!(
            destinations.get("on-sync-failed"),
            &[Destination::new("email", "qa@example.com")]
        );

        let destinations = global_destinations(&subscriptions, &defaults, &BTreeMap::new());
        assert!(destinations.get("on-deployed").is_empty());
        assert_eq!(destinations.len(), 1);
    }

    #[test]
    fn test_resolve_merges_and_dedups() {
        let subscriptions = vec![subscription(&["slack:ops", "slack:ops"], &["on-sync-failed"], "")];
        let resource = resource(
            json!({}),
            json!({
                "notifications.herald.io/subscribe.on-sync-failed.slack": "ops;dev",
            }),
        );

        let destinations =
            resolve_destinations(&resource, PREFIX, &subscriptions, &[], &BTreeMap::new());
        assert_eq!(
            destinations.get("on-sync-failed"),
            &[Destination::new("slack", "ops"), Destination::new("slack", "dev")]
        );
    }

    #[test]
    fn test_resolve_nothing() {
        let resource = resource(json!({}), json!({}));
        let destinations = resolve_destinations(&resource, PREFIX, &[], &[], &BTreeMap::new());
        assert!(destinations.is_empty());
    }
}
