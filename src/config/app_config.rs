use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::{RhaiConfig, deserialize_duration_from_seconds};

fn default_workers() -> usize {
    10
}

fn default_resync_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_config_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_annotation_prefix() -> String {
    "notifications.herald.io".to_string()
}

fn default_max_state_size() -> usize {
    100
}

fn default_resource_variable() -> String {
    "app".to_string()
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from("resources")
}

fn default_qps() -> u32 {
    10
}

fn default_burst() -> u32 {
    100
}

/// Rate limit of the work queue shared by all workers.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Sustained number of items handed out per second.
    #[serde(default = "default_qps")]
    pub qps: u32,

    /// Number of items that may be handed out in a burst.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { qps: default_qps(), burst: default_burst() }
    }
}

/// Application configuration for Herald.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Number of concurrent reconcile workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Work queue rate limit.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Interval at which every known resource is enqueued again.
    #[serde(
        default = "default_resync_interval",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub resync_interval_secs: Duration,

    /// Interval at which the notification settings file is checked for edits.
    #[serde(
        default = "default_config_poll_interval",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub config_poll_interval_secs: Duration,

    /// The maximum time to wait for in-flight items on shutdown.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub shutdown_timeout: Duration,

    /// Prefix of the subscription and state annotations.
    #[serde(default = "default_annotation_prefix")]
    pub annotation_prefix: String,

    /// Maximum number of entries kept in a resource's notification state.
    #[serde(default = "default_max_state_size")]
    pub max_state_size: usize,

    /// Name under which the resource is exposed to conditions and templates.
    #[serde(default = "default_resource_variable")]
    pub resource_variable: String,

    /// Directory holding the watched resources, one JSON document per file.
    /// Relative paths are resolved against the configuration directory.
    #[serde(default = "default_resources_dir")]
    pub resources_dir: PathBuf,

    /// Rhai evaluation limits.
    #[serde(default)]
    pub rhai: RhaiConfig,

    /// Skip resources whose last operation finished after their last
    /// refresh, until the status catches up.
    #[serde(default)]
    pub skip_unrefreshed_operations: bool,

    /// Path to the notification settings file.
    #[serde(skip_deserializing)]
    pub notifications_config_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue: QueueConfig::default(),
            resync_interval_secs: default_resync_interval(),
            config_poll_interval_secs: default_config_poll_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            annotation_prefix: default_annotation_prefix(),
            max_state_size: default_max_state_size(),
            resource_variable: default_resource_variable(),
            resources_dir: default_resources_dir(),
            rhai: RhaiConfig::default(),
            skip_unrefreshed_operations: false,
            notifications_config_path: PathBuf::from("notifications.yaml"),
        }
    }
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading `app.yaml` from the configuration
    /// directory, overridden by `HERALD__*` environment variables.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{config_dir_str}/app.yaml")).required(false))
            .add_source(Environment::with_prefix("HERALD").separator("__"))
            .build()?;
        let mut config: Self = s.try_deserialize()?;

        let config_path = Path::new(config_dir_str);
        config.notifications_config_path = config_path.join("notifications.yaml");
        if config.resources_dir.is_relative() {
            config.resources_dir = config_path.join(&config.resources_dir);
        }

        Ok(config)
    }

    /// Creates a new `AppConfigBuilder` for testing purposes.
    #[cfg(test)]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

/// A builder for creating `AppConfig` instances for testing.
#[cfg(test)]
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn annotation_prefix(mut self, prefix: &str) -> Self {
        self.config.annotation_prefix = prefix.to_string();
        self
    }

    pub fn resources_dir(mut self, dir: &Path) -> Self {
        self.config.resources_dir = dir.to_path_buf();
        self
    }

    pub fn notifications_config_path(mut self, path: &Path) -> Self {
        self.config.notifications_config_path = path.to_path_buf();
        self
    }

    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.config.resync_interval_secs = interval;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
