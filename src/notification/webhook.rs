//! Generic webhook channel.
//!
//! Sends the notification to a configured URL. A template can shape the
//! request per webhook service through its `webhook.<service>` section
//! (method, path appended to the URL, body); otherwise the generic message is
//! sent as the body.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{
    Method,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::Deserialize;
use sha2::Sha256;
use url::Url;

use super::{NotificationService, error::NotificationError};
use crate::{
    config::HttpRetryConfig,
    http_client::HttpClientPool,
    models::{Destination, Notification},
};

/// HMAC SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

fn default_method() -> String {
    "POST".to_string()
}

/// A header added to every request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Basic authentication credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Configuration of a webhook service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookServiceConfig {
    /// Base URL of the webhook.
    pub url: Url,

    /// Headers added to every request.
    #[serde(default)]
    pub headers: Vec<WebhookHeader>,

    /// Optional basic authentication.
    #[serde(default, alias = "basicAuth")]
    pub basic_auth: Option<BasicAuth>,

    /// When set, requests carry an HMAC-SHA256 signature of the body and
    /// timestamp in `X-Signature` and `X-Timestamp`.
    #[serde(default)]
    pub secret: Option<String>,

    /// Method used when the template does not set one.
    #[serde(default = "default_method")]
    pub method: String,

    /// Retry policy for transient failures.
    #[serde(default, alias = "retryPolicy")]
    pub retry_policy: HttpRetryConfig,
}

/// Delivers notifications to a webhook.
#[derive(Debug)]
pub struct WebhookService {
    config: WebhookServiceConfig,
    client_pool: Arc<HttpClientPool>,
}

impl WebhookService {
    /// Creates a webhook service; HTTP clients are taken from `client_pool`.
    pub fn new(config: WebhookServiceConfig, client_pool: Arc<HttpClientPool>) -> Self {
        Self { config, client_pool }
    }

    /// Signs `body` with the configured secret, returning the hex encoded
    /// signature and the timestamp (Unix milliseconds) it covers.
    pub fn sign_payload(secret: &str, body: &str) -> Result<(String, String), NotificationError> {
        // `new_from_slice` accepts empty keys.
        if secret.is_empty() {
            return Err(NotificationError::ConfigError("Invalid secret: cannot be empty.".into()));
        }

        let timestamp = Utc::now().timestamp_millis();
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::ConfigError(format!("Invalid secret: {e}")))?;
        mac.update(format!("{body}{timestamp}").as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok((signature, timestamp.to_string()))
    }

    fn request_url(&self, path: &str) -> String {
        let base = self.config.url.as_str();
        if path.is_empty() {
            return base.to_string();
        }
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn headers(&self, body: &str) -> Result<HeaderMap, NotificationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(secret) = &self.config.secret {
            let (signature, timestamp) = Self::sign_payload(secret, body)?;
            let invalid = |e: reqwest::header::InvalidHeaderValue| {
                NotificationError::NotifyFailed(format!("Invalid signature header: {e}"))
            };
            headers.insert(
                HeaderName::from_static("x-signature"),
                HeaderValue::from_str(&signature).map_err(invalid)?,
            );
            headers.insert(
                HeaderName::from_static("x-timestamp"),
                HeaderValue::from_str(&timestamp).map_err(invalid)?,
            );
        }

        for WebhookHeader { name, value } in &self.config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                NotificationError::ConfigError(format!("Invalid header name: {name}: {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                NotificationError::ConfigError(format!("Invalid header value for {name}: {e}"))
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl NotificationService for WebhookService {
    async fn send(
        &self,
        notification: &Notification,
        destination: &Destination,
    ) -> Result<(), NotificationError> {
        let (method, path, body) = match notification.webhook.get(&destination.service) {
            Some(hook) => {
                let method = if hook.method.is_empty() { &self.config.method } else { &hook.method };
                (method.as_str(), hook.path.as_str(), hook.body.as_str())
            }
            None => (self.config.method.as_str(), "", notification.message.as_str()),
        };

        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| NotificationError::ConfigError(format!("Invalid method '{method}': {e}")))?;
        let url = self.request_url(path);
        let headers = self.headers(body)?;

        let client = self.client_pool.get_or_create(&self.config.retry_policy).await?;
        let mut request = client.request(method, url.as_str()).headers(headers).body(body.to_string());
        if let Some(auth) = &self.config.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        tracing::debug!(service = %destination.service, url = %url, "Sending webhook request");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unable to read response data: {e}"));
            return Err(NotificationError::NotifyFailed(format!(
                "request to {url} has failed with status {status}: {text}"
            )));
        }
        Ok(())
    }
}
