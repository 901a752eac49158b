//! Configuration module for Herald.

mod app_config;
mod helpers;
mod http_retry;
mod loader;
mod rhai;

pub use app_config::{AppConfig, QueueConfig};
pub use helpers::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};
pub use http_retry::{HttpRetryConfig, JitterSetting};
pub use loader::{ConfigLoader, LoaderError};
pub use rhai::RhaiConfig;
