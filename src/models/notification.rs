//! Data models for rendered notifications and their templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum length of [`Notification::preview`], in characters.
const PREVIEW_LEN: usize = 100;

/// Email specific payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotification {
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Message body; the generic message is used when empty.
    #[serde(default)]
    pub body: String,
}

/// Slack specific payload.
///
/// Both fields hold JSON documents (arrays) as text; the Slack service parses
/// them when it builds the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackNotification {
    /// Legacy message attachments, as a JSON array.
    #[serde(default)]
    pub attachments: String,
    /// Block Kit blocks, as a JSON array.
    #[serde(default)]
    pub blocks: String,
}

/// Payload of one named webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// HTTP method; the service default applies when empty.
    #[serde(default)]
    pub method: String,
    /// Path appended to the service URL.
    #[serde(default)]
    pub path: String,
    /// Request body.
    #[serde(default)]
    pub body: String,
}

/// A notification ready to be handed to a channel service.
///
/// The generic `message` is understood by every service. The channel specific
/// payloads are only read by the service they belong to; webhook payloads are
/// keyed by the name of the webhook service that consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Generic text message.
    #[serde(default)]
    pub message: String,

    /// Email payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailNotification>,

    /// Slack payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackNotification>,

    /// Webhook payloads by webhook service name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub webhook: BTreeMap<String, WebhookNotification>,
}

/// A notification template has the same shape as the notification it
/// renders; every string field holds template source.
pub type TemplateSpec = Notification;

impl Notification {
    /// Creates a notification carrying only a generic message.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Default::default() }
    }

    /// A one line summary for logs: the first line of the first non-empty
    /// text field, cut to 100 characters.
    pub fn preview(&self) -> String {
        let candidates = [
            Some(self.message.as_str()),
            self.email.as_ref().map(|email| email.subject.as_str()),
            self.email.as_ref().map(|email| email.body.as_str()),
            self.slack.as_ref().map(|slack| slack.blocks.as_str()),
            self.slack.as_ref().map(|slack| slack.attachments.as_str()),
        ];
        let text = candidates
            .into_iter()
            .flatten()
            .chain(self.webhook.values().map(|hook| hook.body.as_str()))
            .find(|text| !text.trim().is_empty())
            .unwrap_or_default();

        let first_line = text.trim().lines().next().unwrap_or_default();
        if first_line.chars().count() <= PREVIEW_LEN {
            return first_line.to_string();
        }
        let mut preview: String = first_line.chars().take(PREVIEW_LEN - 3).collect();
        preview.push_str("...");
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_uses_message_first_line() {
        let notification = Notification::with_message("Sync failed\nDetails follow");
        assert_eq!(notification.preview(), "Sync failed");
    }

    #[test]
    fn test_preview_falls_back_to_channel_payloads() {
        let notification = Notification {
            email: Some(EmailNotification { subject: "Deployed".into(), body: String::new() }),
            ..Default::default()
        };
        assert_eq!(notification.preview(), "Deployed");

        let mut webhook_only = Notification::default();
        webhook_only.webhook.insert(
            "github".into(),
            WebhookNotification { body: r#"{"state": "success"}"#.into(), ..Default::default() },
        );
        assert_eq!(webhook_only.preview(), r#"{"state": "success"}"#);
    }

    #[test]
    fn test_preview_is_truncated() {
        let notification = Notification::with_message("é".repeat(150));
        let preview = notification.preview();
        assert_eq!(preview.chars().count(), 100);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_empty_notification_preview() {
        assert_eq!(Notification::default().preview(), "");
    }

    #[test]
    fn test_template_spec_deserializes_from_json() {
        let spec: TemplateSpec = serde_json::from_value(serde_json::json!({
            "message": "Application {{ app.metadata.name }} failed",
            "slack": { "blocks": "[]" },
            "webhook": { "github": { "method": "POST", "path": "/status", "body": "{}" } }
        }))
        .unwrap();

        assert_eq!(spec.message, "Application {{ app.metadata.name }} failed");
        assert_eq!(spec.slack.unwrap().attachments, "");
        assert_eq!(spec.webhook["github"].path, "/status");
        assert!(spec.email.is_none());
    }
}
