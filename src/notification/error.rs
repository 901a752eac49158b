//! Error types for the channel services.

use thiserror::Error;

use crate::http_client::HttpClientPoolError;

/// Errors raised while building or using a channel service.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// An error related to invalid or missing service configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No service is registered under the destination's service name.
    #[error("notification service '{0}' is not supported")]
    UnknownService(String),

    /// A channel payload could not be (de)serialized.
    #[error("Invalid payload: {0}")]
    PayloadError(#[from] serde_json::Error),

    /// An error indicating that the notification failed to be sent.
    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    /// An error originating from the HTTP client pool.
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] HttpClientPoolError),

    /// An error from the underlying `reqwest` or `reqwest_middleware`
    /// libraries.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest_middleware::Error),
}

impl From<reqwest::Error> for NotificationError {
    fn from(error: reqwest::Error) -> Self {
        NotificationError::RequestError(reqwest_middleware::Error::Reqwest(error))
    }
}
