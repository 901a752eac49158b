//! Slack channel, posting through the `chat.postMessage` Web API method.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{NotificationService, error::NotificationError};
use crate::{
    config::HttpRetryConfig,
    http_client::HttpClientPool,
    models::{Destination, Notification},
};

static ICON_EMOJI: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"^:.+:$"));

fn default_api_url() -> String {
    "https://slack.com/api".to_string()
}

/// Configuration of a Slack service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlackServiceConfig {
    /// Bot token.
    pub token: String,

    /// Web API base URL.
    #[serde(default = "default_api_url", alias = "apiURL")]
    pub api_url: String,

    /// Overrides the bot user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Icon: an emoji (`:rocket:`) or an image URL.
    #[serde(default)]
    pub icon: Option<String>,

    /// Retry policy for transient failures.
    #[serde(default, alias = "retryPolicy")]
    pub retry_policy: HttpRetryConfig,
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts notifications to Slack channels; the destination recipient is the
/// channel.
#[derive(Debug)]
pub struct SlackService {
    config: SlackServiceConfig,
    client_pool: Arc<HttpClientPool>,
}

fn parse_json_array(field: &str, raw: &str) -> Result<Option<Value>, NotificationError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        NotificationError::NotifyFailed(format!("failed to unmarshal {field} '{raw}': {e}"))
    })?;
    Ok(Some(value))
}

impl SlackService {
    /// Creates a Slack service; HTTP clients are taken from `client_pool`.
    pub fn new(config: SlackServiceConfig, client_pool: Arc<HttpClientPool>) -> Self {
        Self { config, client_pool }
    }

    fn icon(&self) -> (Option<&str>, Option<&str>) {
        let Some(icon) = self.config.icon.as_deref().filter(|i| !i.is_empty()) else {
            return (None, None);
        };
        if ICON_EMOJI.as_ref().is_ok_and(|re| re.is_match(icon)) {
            return (Some(icon), None);
        }
        match Url::parse(icon) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => (None, Some(icon)),
            _ => {
                tracing::warn!(icon, "Icon reference is not a valid emoji or URL");
                (None, None)
            }
        }
    }

    fn message<'a>(
        &'a self,
        notification: &'a Notification,
        channel: &'a str,
    ) -> Result<PostMessage<'a>, NotificationError> {
        let (icon_emoji, icon_url) = self.icon();
        let (attachments, blocks) = match &notification.slack {
            Some(slack) => (
                parse_json_array("attachments", &slack.attachments)?,
                parse_json_array("blocks", &slack.blocks)?,
            ),
            None => (None, None),
        };
        Ok(PostMessage {
            channel,
            text: &notification.message,
            username: self.config.username.as_deref(),
            icon_emoji,
            icon_url,
            attachments,
            blocks,
        })
    }
}

#[async_trait]
impl NotificationService for SlackService {
    async fn send(
        &self,
        notification: &Notification,
        destination: &Destination,
    ) -> Result<(), NotificationError> {
        let message = self.message(notification, &destination.recipient)?;
        let url = format!("{}/chat.postMessage", self.config.api_url.trim_end_matches('/'));

        let client = self.client_pool.get_or_create(&self.config.retry_policy).await?;
        let response =
            client.post(url.as_str()).bearer_auth(&self.config.token).json(&message).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::NotifyFailed(format!(
                "Slack request failed with status: {status}"
            )));
        }
        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(NotificationError::NotifyFailed(format!(
                "Slack API error: {}",
                body.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }
        Ok(())
    }
}
