use std::sync::Arc;

use serde_json::Value;

use crate::{
    models::{Condition, NotificationsSettings, SubscriptionSpec, TemplateSpec},
    notification::NotificationService,
    settings::{CachedConfigProvider, EngineConfigBuilder, StaticSettings},
};

/// A builder for creating `NotificationsSettings` instances for testing.
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: NotificationsSettings,
}

impl SettingsBuilder {
    /// Creates empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a condition to `trigger`.
    pub fn condition(mut self, trigger: &str, condition: Condition) -> Self {
        self.settings.triggers.entry(trigger.to_string()).or_default().push(condition);
        self
    }

    /// Appends a condition sending `templates` when `when` holds.
    pub fn trigger(self, trigger: &str, when: &str, templates: &[&str]) -> Self {
        self.condition(trigger, Condition::new(when, templates))
    }

    /// Adds a template with only a message.
    pub fn template(self, name: &str, message: &str) -> Self {
        self.template_spec(name, TemplateSpec::with_message(message))
    }

    /// Adds a complete template.
    pub fn template_spec(mut self, name: &str, template: TemplateSpec) -> Self {
        self.settings.templates.insert(name.to_string(), template);
        self
    }

    /// Adds a service definition.
    pub fn service(mut self, name: &str, definition: Value) -> Self {
        self.settings.services.insert(name.to_string(), definition);
        self
    }

    /// Adds a default subscription.
    pub fn subscription(mut self, recipients: &[&str], triggers: &[&str], selector: &str) -> Self {
        self.settings.subscriptions.push(SubscriptionSpec {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            selector: selector.to_string(),
        });
        self
    }

    /// Sets the default triggers.
    pub fn default_triggers(mut self, triggers: &[&str]) -> Self {
        self.settings.default_triggers = triggers.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Adds a `context` value.
    pub fn context(mut self, key: &str, value: Value) -> Self {
        self.settings.context.insert(key.to_string(), value);
        self
    }

    /// Adds a secret.
    pub fn secret(mut self, name: &str, value: &str) -> Self {
        self.settings.secrets.insert(name.to_string(), value.to_string());
        self
    }

    /// Builds the settings.
    pub fn build(self) -> NotificationsSettings {
        self.settings
    }
}

/// A config provider over fixed `settings`, with `services` registered as
/// ready-made instances of type `recording`.
pub fn static_provider(
    settings: NotificationsSettings,
    services: &[(&str, Arc<dyn NotificationService>)],
) -> Arc<CachedConfigProvider> {
    let builder = services.iter().fold(EngineConfigBuilder::new(), |builder, (name, service)| {
        builder.service_instance(name, "recording", Arc::clone(service))
    });
    Arc::new(CachedConfigProvider::new(Box::new(StaticSettings(settings)), builder))
}
