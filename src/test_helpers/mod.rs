//! A set of helpers for testing

mod resource;
mod service;
mod settings;

pub use resource::ResourceBuilder;
pub use service::{RecordingService, SentNotification};
pub use settings::{SettingsBuilder, static_provider};
