//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    controller::{DestinationsHook, NotificationController, WorkQueue, operation_finished_after_refresh},
    engine::rhai::RhaiCompiler,
    http_client::HttpClientPool,
    metrics::MetricsSink,
    settings::{
        CachedConfigProvider, ConfigProvider, EngineConfigBuilder, FileSettingsSource,
        SettingsSource,
    },
    store::{FileResourceStore, ResourceStore},
};

/// A builder for creating a `Supervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn ResourceStore>>,
    settings_source: Option<Box<dyn SettingsSource>>,
    engine_config: Option<EngineConfigBuilder>,
    metrics: Option<Arc<dyn MetricsSink>>,
    destinations_hook: Option<Arc<dyn DestinationsHook>>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the resource store. Defaults to a [`FileResourceStore`] over the
    /// configured resources directory.
    pub fn store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets where notification settings are read from. Defaults to the
    /// configured settings file.
    pub fn settings_source(mut self, source: Box<dyn SettingsSource>) -> Self {
        self.settings_source = Some(source);
        self
    }

    /// Sets the engine configuration builder, e.g. to register custom
    /// services. The annotation prefix of the application configuration
    /// always applies.
    pub fn engine_config(mut self, builder: EngineConfigBuilder) -> Self {
        self.engine_config = Some(builder);
        self
    }

    /// Sets the metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the destinations hook of the controller.
    pub fn destinations_hook(mut self, hook: Arc<dyn DestinationsHook>) -> Self {
        self.destinations_hook = Some(hook);
        self
    }

    /// Assembles and validates the components to build a `Supervisor`.
    ///
    /// The notification settings are loaded and compiled here, so an invalid
    /// settings file prevents startup instead of failing every reconcile pass.
    pub fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;

        let store = self.store.unwrap_or_else(|| {
            Arc::new(FileResourceStore::new(config.resources_dir.clone())) as Arc<dyn ResourceStore>
        });
        let source = self.settings_source.unwrap_or_else(|| {
            let path = config.notifications_config_path.clone();
            Box::new(FileSettingsSource::new(path)) as Box<dyn SettingsSource>
        });
        let engine_config = self
            .engine_config
            .unwrap_or_else(|| {
                EngineConfigBuilder::new()
                    .compiler(Arc::new(RhaiCompiler::new(config.rhai.clone())))
                    .client_pool(Arc::new(HttpClientPool::new()))
            })
            .annotation_prefix(&config.annotation_prefix);

        let config_provider = Arc::new(CachedConfigProvider::new(source, engine_config));
        config_provider.get_config()?;

        let mut controller = NotificationController::builder()
            .store(Arc::clone(&store))
            .config_provider(Arc::clone(&config_provider) as Arc<dyn ConfigProvider>)
            .resource_variable(&config.resource_variable)
            .max_state_size(config.max_state_size);
        if let Some(metrics) = self.metrics {
            controller = controller.metrics(metrics);
        }
        if let Some(hook) = self.destinations_hook {
            controller = controller.destinations_hook(hook);
        }
        if config.skip_unrefreshed_operations {
            controller = controller.skip_processing(Arc::new(operation_finished_after_refresh));
        }
        let controller = Arc::new(controller.build()?);

        let queue = Arc::new(WorkQueue::new(&config.queue));

        Ok(Supervisor {
            config: Arc::new(config),
            store,
            config_provider,
            controller,
            queue,
            cancellation_token: CancellationToken::new(),
            join_set: JoinSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::NotificationsSettings,
        settings::{MockSettingsSource, SettingsError, StaticSettings},
        store::InMemoryResourceStore,
    };

    #[test]
    fn build_fails_if_config_is_missing() {
        let result = SupervisorBuilder::new()
            .store(Arc::new(InMemoryResourceStore::new()))
            .settings_source(Box::new(StaticSettings::default()))
            .build();
        assert!(matches!(result, Err(SupervisorError::MissingConfig)));
    }

    #[test]
    fn build_fails_if_settings_are_invalid() {
        let mut source = MockSettingsSource::new();
        source.expect_load().returning(|| {
            Err(SettingsError::UnknownTemplate { trigger: "t".into(), template: "missing".into() })
        });
        source.expect_version().returning(|| None);

        let result = SupervisorBuilder::new()
            .config(AppConfig::default())
            .store(Arc::new(InMemoryResourceStore::new()))
            .settings_source(Box::new(source))
            .build();
        assert!(matches!(result, Err(SupervisorError::Settings(_))));
    }

    #[test]
    fn build_fails_if_settings_file_is_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = AppConfig::builder()
            .notifications_config_path(&temp_dir.path().join("notifications.yaml"))
            .resources_dir(temp_dir.path())
            .build();

        let result = SupervisorBuilder::new().config(config).build();
        assert!(matches!(result, Err(SupervisorError::Settings(SettingsError::Loader(_)))));
    }

    #[test]
    fn build_applies_annotation_prefix() {
        let config = AppConfig::builder().annotation_prefix("example.com").build();
        let supervisor = SupervisorBuilder::new()
            .config(config)
            .store(Arc::new(InMemoryResourceStore::new()))
            .settings_source(Box::new(StaticSettings(NotificationsSettings::default())))
            .build()
            .unwrap();

        let engine_config = supervisor.config_provider.get_config().unwrap();
        assert_eq!(engine_config.annotation_prefix, "example.com");
    }
}
