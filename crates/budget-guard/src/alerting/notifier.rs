//! Notification delivery
//!
//! Notifications are best effort. [`Notifier::notify`] never fails: delivery
//! problems are logged locally and swallowed so that the control loop keeps
//! running whatever the chat service does.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Slack error code returned when the bot is not a member of the channel
const NOT_IN_CHANNEL: &str = "not_in_channel";

/// A best-effort message sink
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Post a message; never fails
    async fn notify(&self, message: &str);
}

/// How a message reached the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Posted on the first attempt
    Posted,
    /// Posted after joining the channel
    PostedAfterJoin,
}

/// Notification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// The request did not complete or returned a non-success status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Slack answered `ok: false`
    #[error("Slack API error: {0}")]
    Api(String),
}

/// Slack Web API client shared by every channel notifier
#[derive(Clone)]
pub struct SlackApi {
    client: Client,
    api_base: String,
    token: String,
}

impl SlackApi {
    /// Create a client for `api_base` (normally `https://slack.com/api`)
    pub fn new(client: Client, api_base: impl Into<String>, token: String) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Notifier posting to one channel
    pub fn channel(&self, channel: impl Into<String>) -> SlackNotifier {
        SlackNotifier {
            api: self.clone(),
            channel: channel.into(),
        }
    }

    async fn call<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Http(format!(
                "Slack returned {}: {}",
                status, body
            )));
        }

        let parsed: SlackResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        if parsed.ok {
            Ok(())
        } else {
            Err(NotificationError::Api(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

/// Posts to one Slack channel, joining it once if needed
pub struct SlackNotifier {
    api: SlackApi,
    channel: String,
}

impl SlackNotifier {
    /// Channel this notifier posts to
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Post a message, joining the channel and retrying once on `not_in_channel`
    pub async fn deliver(&self, text: &str) -> Result<Delivery, NotificationError> {
        let message = PostMessage {
            channel: &self.channel,
            text,
        };

        match self.api.call("chat.postMessage", &message).await {
            Ok(()) => Ok(Delivery::Posted),
            Err(NotificationError::Api(code)) if code == NOT_IN_CHANNEL => {
                info!(channel = %self.channel, "Not a channel member, joining");
                self.api
                    .call(
                        "conversations.join",
                        &JoinConversation {
                            channel: &self.channel,
                        },
                    )
                    .await?;
                self.api.call("chat.postMessage", &message).await?;
                Ok(Delivery::PostedAfterJoin)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, message: &str) {
        match self.deliver(message).await {
            Ok(delivery) => {
                debug!(channel = %self.channel, ?delivery, "Slack notification sent");
            }
            Err(e) => {
                error!(channel = %self.channel, error = %e, "Failed to send Slack notification");
            }
        }
    }
}

/// Writes notifications to the log only
#[derive(Debug, Clone)]
pub struct LogNotifier {
    channel: String,
}

impl LogNotifier {
    /// Create a log-only sink labelled with a channel name
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        warn!(channel = %self.channel, "{}", message);
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
}

// Slack request payloads
#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct JoinConversation<'a> {
    channel: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn notifier_for(server: &MockServer) -> SlackNotifier {
        let http = crate::providers::http_client(Duration::from_secs(5)).unwrap();
        SlackApi::new(http, server.uri(), "xoxb-test".into()).channel("alerts")
    }

    #[tokio::test]
    async fn test_posts_message() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat.postMessage"))
            .and(matchers::header("authorization", "Bearer xoxb-test"))
            .and(matchers::body_json(json!({"channel": "alerts", "text": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let delivery = notifier_for(&server).deliver("hello").await.unwrap();
        assert_eq!(delivery, Delivery::Posted);
    }

    #[tokio::test]
    async fn test_joins_then_retries_original_message_once() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "not_in_channel"})),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/conversations.join"))
            .and(matchers::body_json(json!({"channel": "alerts"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat.postMessage"))
            .and(matchers::body_json(json!({"channel": "alerts", "text": "budget alert"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let delivery = notifier_for(&server).deliver("budget alert").await.unwrap();
        assert_eq!(delivery, Delivery::PostedAfterJoin);
    }

    #[tokio::test]
    async fn test_retry_is_bounded_to_one() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "not_in_channel"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/conversations.join"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let err = notifier_for(&server).deliver("x").await.unwrap_err();
        assert_eq!(err, NotificationError::Api("not_in_channel".into()));
    }

    #[tokio::test]
    async fn test_failed_join_stops_without_retry() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "not_in_channel"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/conversations.join"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "channel_not_found"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = notifier_for(&server).deliver("x").await.unwrap_err();
        assert_eq!(err, NotificationError::Api("channel_not_found".into()));
    }

    #[tokio::test]
    async fn test_other_api_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "invalid_auth"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/conversations.join"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(0)
            .mount(&server)
            .await;

        let err = notifier_for(&server).deliver("x").await.unwrap_err();
        assert_eq!(err, NotificationError::Api("invalid_auth".into()));
    }

    #[tokio::test]
    async fn test_notify_swallows_transport_errors() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        // Must return normally
        notifier_for(&server).notify("x").await;
    }
}
