//! Compiled engine configuration.
//!
//! [`EngineConfig`] is what a reconcile pass works with: triggers and
//! templates compiled, service definitions turned into a registry, default
//! subscriptions parsed. It is built from the raw
//! [`NotificationsSettings`] by an [`EngineConfigBuilder`] and cached by a
//! [`ConfigProvider`].

mod provider;
mod secrets;

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::{Map, Value};
use thiserror::Error;

pub use provider::{
    CachedConfigProvider, ConfigProvider, FileSettingsSource, SettingsSource, StaticSettings,
};
#[cfg(test)]
pub use provider::{MockConfigProvider, MockSettingsSource};
pub use secrets::substitute_secrets;

use crate::{
    config::{LoaderError, RhaiConfig},
    engine::{
        rhai::RhaiCompiler,
        templates::{TemplateService, TemplateServiceError},
        triggers::{TriggerError, TriggerService},
    },
    http_client::HttpClientPool,
    models::{Destinations, NotificationsSettings, Resource},
    notification::{NotificationError, NotificationService, ServiceConstructor, ServiceRegistry},
    subscriptions::{SelectorError, Subscription, resolve_destinations},
};

/// Default prefix of the subscription and state annotations.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "notifications.herald.io";

/// Errors raised while building the engine configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be loaded.
    #[error("Failed to load notification settings: {0}")]
    Loader(#[from] LoaderError),

    /// A trigger condition does not compile.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// A template does not compile.
    #[error(transparent)]
    Template(#[from] TemplateServiceError),

    /// A default subscription has an invalid selector.
    #[error("Invalid subscription selector: {0}")]
    Selector(#[from] SelectorError),

    /// A service definition is invalid.
    #[error("Invalid service definition: {0}")]
    Service(#[from] NotificationError),

    /// A condition sends a template that does not exist.
    #[error("trigger '{trigger}' references unknown template '{template}'")]
    UnknownTemplate {
        /// Trigger name.
        trigger: String,
        /// Missing template name.
        template: String,
    },
}

/// Everything a reconcile pass needs, compiled and validated.
pub struct EngineConfig {
    /// Compiled triggers.
    pub triggers: TriggerService,
    /// Compiled templates.
    pub templates: TemplateService,
    /// Configured channel services.
    pub services: ServiceRegistry,
    /// Label-selector based default subscriptions.
    pub subscriptions: Vec<Subscription>,
    /// Triggers used when a subscription names none.
    pub default_triggers: Vec<String>,
    /// Per service override of `default_triggers`.
    pub service_default_triggers: BTreeMap<String, Vec<String>>,
    /// Values exposed to conditions and templates as `context`.
    pub context: Map<String, Value>,
    /// Prefix of the subscription and state annotations.
    pub annotation_prefix: String,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("triggers", &self.triggers.names().collect::<Vec<_>>())
            .field("templates", &self.templates.names().collect::<Vec<_>>())
            .field("services", &self.services)
            .field("subscriptions", &self.subscriptions.len())
            .field("default_triggers", &self.default_triggers)
            .field("annotation_prefix", &self.annotation_prefix)
            .finish()
    }
}

impl EngineConfig {
    /// Returns a builder with default options.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Destinations of `resource` per trigger, from the default subscriptions
    /// and the resource's own annotations.
    pub fn destinations(&self, resource: &Resource) -> Destinations {
        resolve_destinations(
            resource,
            &self.annotation_prefix,
            &self.subscriptions,
            &self.default_triggers,
            &self.service_default_triggers,
        )
    }

    /// Name of the annotation holding the notification state.
    pub fn state_annotation(&self) -> String {
        format!("notified.{}", self.annotation_prefix)
    }
}

/// Builds [`EngineConfig`] values from raw settings.
///
/// The builder is kept by the config provider and reused on every rebuild,
/// so compiled expressions and HTTP clients survive configuration changes.
pub struct EngineConfigBuilder {
    compiler: Option<Arc<RhaiCompiler>>,
    client_pool: Option<Arc<HttpClientPool>>,
    custom_services: BTreeMap<String, ServiceConstructor>,
    service_instances: Vec<(String, String, Arc<dyn NotificationService>)>,
    annotation_prefix: String,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            compiler: None,
            client_pool: None,
            custom_services: BTreeMap::new(),
            service_instances: Vec::new(),
            annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
        }
    }
}

impl EngineConfigBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expression compiler.
    pub fn compiler(mut self, compiler: Arc<RhaiCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Sets the HTTP client pool shared by the HTTP services.
    pub fn client_pool(mut self, client_pool: Arc<HttpClientPool>) -> Self {
        self.client_pool = Some(client_pool);
        self
    }

    /// Registers a constructor for service definitions of `service_type`.
    pub fn custom_service(mut self, service_type: &str, constructor: ServiceConstructor) -> Self {
        self.custom_services.insert(service_type.to_string(), constructor);
        self
    }

    /// Registers a ready-made service under `name`, on top of the services
    /// defined in the settings.
    pub fn service_instance(
        mut self,
        name: &str,
        service_type: &str,
        service: Arc<dyn NotificationService>,
    ) -> Self {
        self.service_instances.push((name.to_string(), service_type.to_string(), service));
        self
    }

    /// Sets the annotation prefix.
    pub fn annotation_prefix(mut self, prefix: &str) -> Self {
        self.annotation_prefix = prefix.to_string();
        self
    }

    /// Compiles `settings` into an [`EngineConfig`].
    ///
    /// The expression cache of the compiler is cleared first, so expressions
    /// of earlier settings do not pile up across reloads.
    pub fn build(&self, settings: &NotificationsSettings) -> Result<EngineConfig, SettingsError> {
        let compiler = match &self.compiler {
            Some(compiler) => Arc::clone(compiler),
            None => Arc::new(RhaiCompiler::new(RhaiConfig::default())),
        };
        compiler.clear_cache();
        let client_pool = match &self.client_pool {
            Some(pool) => Arc::clone(pool),
            None => Arc::new(HttpClientPool::new()),
        };

        let triggers = TriggerService::new(compiler, &settings.triggers)?;
        let templates = TemplateService::from_specs(&settings.templates)?;
        for (trigger, conditions) in &settings.triggers {
            for template in conditions.iter().flat_map(|c| &c.send) {
                if !templates.contains(template) {
                    return Err(SettingsError::UnknownTemplate {
                        trigger: trigger.clone(),
                        template: template.clone(),
                    });
                }
            }
        }

        let definitions: BTreeMap<String, Value> = settings
            .services
            .iter()
            .map(|(name, definition)| (name.clone(), substitute_secrets(definition, &settings.secrets)))
            .collect();
        let mut services =
            ServiceRegistry::from_definitions(&definitions, client_pool, &self.custom_services)?;
        for (name, service_type, service) in &self.service_instances {
            services.register_instance(name, service_type, Arc::clone(service));
        }

        let subscriptions = settings
            .subscriptions
            .iter()
            .map(Subscription::from_spec)
            .collect::<Result<Vec<_>, _>>()?;

        for trigger in settings.default_triggers.iter().chain(settings.service_default_triggers.values().flatten()) {
            if !triggers.contains(trigger) {
                tracing::warn!(trigger = %trigger, "Default trigger is not configured");
            }
        }

        tracing::debug!(
            triggers = settings.triggers.len(),
            templates = settings.templates.len(),
            services = settings.services.len(),
            subscriptions = subscriptions.len(),
            "Built engine configuration"
        );

        Ok(EngineConfig {
            triggers,
            templates,
            services,
            subscriptions,
            default_triggers: settings.default_triggers.clone(),
            service_default_triggers: settings.service_default_triggers.clone(),
            context: settings.context.clone(),
            annotation_prefix: self.annotation_prefix.clone(),
        })
    }
}
