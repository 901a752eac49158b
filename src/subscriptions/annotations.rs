//! Subscriptions declared in resource annotations.
//!
//! Keys follow `<prefix>/subscribe.<trigger>.<service>`; the trigger segment
//! may be omitted (`<prefix>/subscribe.<service>`), in which case the
//! subscription applies to the default triggers. Values are `;` separated
//! recipient lists.

use std::collections::BTreeMap;

use crate::models::{Destination, Destinations};

/// Annotation key of the subscription of `service` to `trigger`.
pub fn subscribe_annotation_key(prefix: &str, trigger: &str, service: &str) -> String {
    format!("{prefix}/subscribe.{trigger}.{service}")
}

fn parse_recipients(value: &str) -> Vec<String> {
    value.split(';').map(str::trim).filter(|r| !r.is_empty()).map(String::from).collect()
}

/// One parsed subscription annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSubscription {
    /// Annotation key it was read from.
    pub key: String,
    /// Trigger name, `None` for the default triggers.
    pub trigger: Option<String>,
    /// Service name.
    pub service: String,
    /// Recipients; an empty value yields a single empty recipient.
    pub recipients: Vec<String>,
}

/// A view over a resource's annotations that reads and edits subscriptions
/// under one prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionAnnotations {
    prefix: String,
    annotations: BTreeMap<String, String>,
}

impl SubscriptionAnnotations {
    /// Wraps `annotations`.
    pub fn new(prefix: impl Into<String>, annotations: BTreeMap<String, String>) -> Self {
        Self { prefix: prefix.into(), annotations }
    }

    /// The annotations, including edits.
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Consumes the view and returns the annotations.
    pub fn into_annotations(self) -> BTreeMap<String, String> {
        self.annotations
    }

    /// Every subscription annotation, in key order.
    pub fn subscriptions(&self) -> Vec<AnnotationSubscription> {
        let prefix = format!("{}/subscribe.", self.prefix);
        self.annotations
            .iter()
            .filter_map(|(key, value)| {
                let rest = key.strip_prefix(&prefix)?;
                let (trigger, service) = match rest.rsplit_once('.') {
                    Some((trigger, service)) => {
                        (Some(trigger).filter(|t| !t.is_empty()), service)
                    }
                    None => (None, rest),
                };
                if service.is_empty() {
                    return None;
                }
                let recipients =
                    if value.trim().is_empty() { vec![String::new()] } else { parse_recipients(value) };
                Some(AnnotationSubscription {
                    key: key.clone(),
                    trigger: trigger.map(String::from),
                    service: service.to_string(),
                    recipients,
                })
            })
            .collect()
    }

    /// Adds `recipients` to the subscription of `service` to `trigger`,
    /// keeping existing recipients and their order.
    pub fn subscribe(&mut self, trigger: &str, service: &str, recipients: &[&str]) {
        let key = subscribe_annotation_key(&self.prefix, trigger, service);
        let mut current = self.annotations.get(&key).map(|v| parse_recipients(v)).unwrap_or_default();
        for recipient in recipients {
            if !current.iter().any(|r| r == recipient) {
                current.push(recipient.to_string());
            }
        }
        self.annotations.insert(key, current.join(";"));
    }

    /// Removes `recipient` from the subscription of `service` to `trigger`.
    /// The annotation is dropped once it has no recipient left.
    pub fn unsubscribe(&mut self, trigger: &str, service: &str, recipient: &str) {
        let matching: Vec<AnnotationSubscription> = self
            .subscriptions()
            .into_iter()
            .filter(|s| s.trigger.as_deref().unwrap_or_default() == trigger && s.service == service)
            .collect();
        for subscription in matching {
            let remaining: Vec<String> =
                subscription.recipients.into_iter().filter(|r| r != recipient).collect();
            if remaining.is_empty() || remaining.iter().all(String::is_empty) {
                self.annotations.remove(&subscription.key);
            } else {
                self.annotations.insert(subscription.key, remaining.join(";"));
            }
        }
    }

    /// Whether `recipient` of `service` is subscribed to any trigger.
    pub fn has(&self, service: &str, recipient: &str) -> bool {
        self.subscriptions()
            .iter()
            .any(|s| s.service == service && s.recipients.iter().any(|r| r == recipient))
    }

    /// Destinations per trigger. Subscriptions without a trigger apply to the
    /// service's default triggers when configured, otherwise to
    /// `default_triggers`.
    pub fn destinations(
        &self,
        default_triggers: &[String],
        service_default_triggers: &BTreeMap<String, Vec<String>>,
    ) -> Destinations {
        let mut destinations = Destinations::new();
        for subscription in self.subscriptions() {
            let triggers: Vec<String> = match &subscription.trigger {
                Some(trigger) => vec![trigger.clone()],
                None => service_default_triggers
                    .get(&subscription.service)
                    .cloned()
                    .unwrap_or_else(|| default_triggers.to_vec()),
            };
            for recipient in &subscription.recipients {
                for trigger in &triggers {
                    destinations
                        .add(trigger.clone(), Destination::new(&subscription.service, recipient.as_str()));
                }
            }
        }
        destinations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "notifications.herald.io";

    fn annotations(pairs: &[(&str, &str)]) -> SubscriptionAnnotations {
        SubscriptionAnnotations::new(
            PREFIX,
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[test]
    fn test_parse_subscriptions() {
        let a = annotations(&[
            ("notifications.herald.io/subscribe.on-sync-failed.slack", "ops; dev ;"),
            ("notifications.herald.io/subscribe.email", "team@example.com"),
            ("notifications.herald.io/subscribe..webhook", ""),
            ("other.io/subscribe.on-deployed.slack", "ignored"),
        ]);
        let subscriptions = a.subscriptions();
        assert_eq!(subscriptions.len(), 3);

        let webhook = &subscriptions[0];
        assert_eq!(webhook.trigger, None);
        assert_eq!(webhook.service, "webhook");
        assert_eq!(webhook.recipients, vec![String::new()]);

        let slack = &subscriptions[2];
        assert_eq!(slack.trigger.as_deref(), Some("on-sync-failed"));
        assert_eq!(slack.recipients, vec!["ops".to_string(), "dev".to_string()]);
    }

    #[test]
    fn test_destinations() {
        let a = annotations(&[
            ("notifications.herald.io/subscribe.on-sync-failed.slack", "ops"),
            ("notifications.herald.io/subscribe.email", "team@example.com"),
            ("notifications.herald.io/subscribe.slack", "general"),
        ]);
        let defaults = vec!["on-deployed".to_string(), "on-health-degraded".to_string()];
        let service_defaults =
            BTreeMap::from([("slack".to_string(), vec!["on-sync-running".to_string()])]);

        let destinations = a.destinations(&defaults, &service_defaults);
        assert_eq!(destinations.get("on-sync-failed"), &[Destination::new("slack", "ops")]);
        assert_eq!(destinations.get("on-sync-running"), &[Destination::new("slack", "general")]);
        assert_eq!(
            destinations.get("on-deployed"),
            &[Destination::new("email", "team@example.com")]
        );
        assert_eq!(
            destinations.get("on-health-degraded"),
            &[Destination::new("email", "team@example.com")]
        );
    }

    #[test]
    fn test_subscribe() {
        let mut a = annotations(&[]);
        a.subscribe("my-trigger", "slack", &["my-channel1"]);
        a.subscribe("my-trigger", "slack", &["my-channel2", "my-channel1"]);
        assert_eq!(
            a.annotations()["notifications.herald.io/subscribe.my-trigger.slack"],
            "my-channel1;my-channel2"
        );
        assert!(a.has("slack", "my-channel2"));
        assert!(!a.has("email", "my-channel2"));
    }

    #[test]
    fn test_unsubscribe() {
        let mut a = annotations(&[(
            "notifications.herald.io/subscribe.my-trigger.slack",
            "my-channel1;my-channel2",
        )]);
        a.unsubscribe("my-trigger", "slack", "my-channel1");
        assert_eq!(
            a.annotations()["notifications.herald.io/subscribe.my-trigger.slack"],
            "my-channel2"
        );
        a.unsubscribe("my-trigger", "slack", "my-channel2");
        assert!(a.into_annotations().is_empty());
    }
}
