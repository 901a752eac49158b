//! # Notification Services
//!
//! Channel services deliver rendered notifications to destinations. Every
//! service implements [`NotificationService`]; the [`ServiceRegistry`] maps
//! the service names used by destinations to configured instances.
//!
//! ## Builtin services
//!
//! - **`webhook`**: a configurable HTTP request, optionally shaped per
//!   template through the `webhook.<service>` section of a notification.
//! - **`slack`**: posts to a channel through the Slack Web API.
//! - **`log`**: writes the notification to the application log.
//!
//! Services of other types can be plugged in with a
//! [`registry::ServiceConstructor`].

use async_trait::async_trait;

use crate::models::{Destination, Notification};

pub mod error;
pub mod log;
pub mod registry;
pub mod slack;
pub mod webhook;

pub use error::NotificationError;
pub use log::{LogService, LogServiceConfig};
pub use registry::{ServiceConfig, ServiceConstructor, ServiceFactory, ServiceRegistry};
pub use slack::{SlackService, SlackServiceConfig};
pub use webhook::{WebhookService, WebhookServiceConfig};

/// A channel capable of delivering a notification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Delivers `notification` to `destination`.
    async fn send(
        &self,
        notification: &Notification,
        destination: &Destination,
    ) -> Result<(), NotificationError>;
}
