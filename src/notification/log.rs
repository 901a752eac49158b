//! A channel that writes notifications to the application log.

use async_trait::async_trait;
use serde::Deserialize;

use super::{NotificationService, error::NotificationError};
use crate::models::{Destination, Notification};

/// Configuration of a log service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogServiceConfig {
    /// Logs the whole rendered notification as JSON instead of its preview.
    #[serde(default)]
    pub full: bool,
}

/// Writes every notification to the log at info level.
#[derive(Debug, Default)]
pub struct LogService {
    config: LogServiceConfig,
}

impl LogService {
    /// Creates a log service.
    pub fn new(config: LogServiceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NotificationService for LogService {
    async fn send(
        &self,
        notification: &Notification,
        destination: &Destination,
    ) -> Result<(), NotificationError> {
        if self.config.full {
            let payload = serde_json::to_string(notification)?;
            tracing::info!(service = %destination.service, recipient = %destination.recipient, %payload, "Notification");
        } else {
            tracing::info!(
                service = %destination.service,
                recipient = %destination.recipient,
                preview = %notification.preview(),
                "Notification"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_service_never_fails() {
        let destination = Destination::new("log", "");
        let notification = Notification::with_message("deployed");

        assert!(LogService::default().send(&notification, &destination).await.is_ok());
        let full = LogService::new(LogServiceConfig { full: true });
        assert!(full.send(&notification, &destination).await.is_ok());
    }
}
