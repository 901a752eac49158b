//! Named channel services and the factories that build them.

use std::{collections::BTreeMap, fmt, sync::Arc};

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use super::{
    NotificationService,
    error::NotificationError,
    log::{LogService, LogServiceConfig},
    slack::{SlackService, SlackServiceConfig},
    webhook::{WebhookService, WebhookServiceConfig},
};
use crate::{
    http_client::HttpClientPool,
    models::{Destination, Notification},
};

/// Builds a service instance on first use.
pub type ServiceFactory =
    Arc<dyn Fn() -> Result<Arc<dyn NotificationService>, NotificationError> + Send + Sync>;

/// Builds a service of a custom type from its (secret substituted)
/// definition.
pub type ServiceConstructor =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn NotificationService>, NotificationError> + Send + Sync>;

/// Definition of a builtin service, selected by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceConfig {
    /// Generic webhook.
    Webhook(WebhookServiceConfig),
    /// Slack Web API.
    Slack(SlackServiceConfig),
    /// Application log.
    Log(LogServiceConfig),
}

impl ServiceConfig {
    /// The `type` name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServiceConfig::Webhook(_) => "webhook",
            ServiceConfig::Slack(_) => "slack",
            ServiceConfig::Log(_) => "log",
        }
    }

    fn into_factory(self, client_pool: Arc<HttpClientPool>) -> ServiceFactory {
        Arc::new(move || {
            let service: Arc<dyn NotificationService> = match &self {
                ServiceConfig::Webhook(config) => {
                    Arc::new(WebhookService::new(config.clone(), client_pool.clone()))
                }
                ServiceConfig::Slack(config) => {
                    Arc::new(SlackService::new(config.clone(), client_pool.clone()))
                }
                ServiceConfig::Log(config) => Arc::new(LogService::new(config.clone())),
            };
            Ok(service)
        })
    }
}

struct RegisteredService {
    service_type: String,
    factory: ServiceFactory,
}

/// Channel services by name.
///
/// Instances are created lazily from their factory and reused afterwards; a
/// factory that fails is retried on the next send.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, RegisteredService>,
    instances: DashMap<String, Arc<dyn NotificationService>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.services.iter().map(|(name, s)| (name, &s.service_type)))
            .finish()
    }
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from service definitions.
    ///
    /// Builtin types are validated eagerly so a malformed definition fails
    /// here; types listed in `custom` are handed to their constructor when
    /// first used.
    pub fn from_definitions(
        definitions: &BTreeMap<String, Value>,
        client_pool: Arc<HttpClientPool>,
        custom: &BTreeMap<String, ServiceConstructor>,
    ) -> Result<Self, NotificationError> {
        let mut registry = Self::new();
        for (name, definition) in definitions {
            let service_type = definition.get("type").and_then(Value::as_str).ok_or_else(|| {
                NotificationError::ConfigError(format!("service '{name}' has no type"))
            })?;

            if let Some(constructor) = custom.get(service_type) {
                let constructor = constructor.clone();
                let definition = definition.clone();
                registry.register(name, service_type, Arc::new(move || constructor(&definition)));
                continue;
            }

            let config: ServiceConfig = serde_json::from_value(definition.clone()).map_err(|e| {
                NotificationError::ConfigError(format!("invalid service '{name}': {e}"))
            })?;
            let service_type = config.type_name();
            registry.register(name, service_type, config.into_factory(client_pool.clone()));
        }
        Ok(registry)
    }

    /// Registers `factory` under `name`, replacing a previous registration.
    pub fn register(&mut self, name: &str, service_type: &str, factory: ServiceFactory) {
        self.instances.remove(name);
        self.services.insert(
            name.to_string(),
            RegisteredService { service_type: service_type.to_string(), factory },
        );
    }

    /// Registers an already built service.
    pub fn register_instance(
        &mut self,
        name: &str,
        service_type: &str,
        service: Arc<dyn NotificationService>,
    ) {
        self.register(name, service_type, Arc::new(move || Ok(service.clone())));
    }

    /// Whether a service is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered service names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// The `type` of the service registered under `name`.
    pub fn service_type(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(|s| s.service_type.as_str())
    }

    /// The service registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn NotificationService>, NotificationError> {
        if let Some(instance) = self.instances.get(name) {
            return Ok(instance.value().clone());
        }
        let registered =
            self.services.get(name).ok_or_else(|| NotificationError::UnknownService(name.into()))?;
        let instance = (registered.factory)()?;
        self.instances.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    /// Sends `notification` through the destination's service.
    pub async fn send(
        &self,
        notification: &Notification,
        destination: &Destination,
    ) -> Result<(), NotificationError> {
        self.get(&destination.service)?.send(notification, destination).await
    }
}
