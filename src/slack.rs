//! Slack Events API integration: answers messages that mention the bot.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::chat::{reply_or_fallback, Assistant};
use crate::compliance::redact_message;
use crate::db::Database;
use crate::models::{CreateLogInput, LogLevel};

pub const SLACK_PIPELINE: &str = "SLACK_BOT";

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
    user_id: Option<String>,
}

impl SlackResponse {
    fn into_result(self) -> Result<Self, SlackError> {
        if self.ok {
            Ok(self)
        } else {
            Err(SlackError::Api(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

/// Minimal Slack Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    base_url: String,
    token: String,
    client: Client,
}

impl SlackClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    /// `auth.test`: the bot's own user id.
    pub async fn auth_test(&self) -> Result<String, SlackError> {
        let response: SlackResponse = self
            .client
            .post(format!("{}/auth.test", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?;

        response
            .into_result()?
            .user_id
            .ok_or_else(|| SlackError::Api("auth.test returned no user_id".to_string()))
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackError> {
        let response: SlackResponse = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": channel, "text": text }))
            .send()
            .await?
            .json()
            .await?;

        response.into_result().map(|_| ())
    }
}

/// Body of an Events API callback.
#[derive(Debug, Default, Deserialize)]
pub struct EventEnvelope {
    pub challenge: Option<String>,
    pub event: Option<MessageEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub text: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
}

/// A message addressed to the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub text: String,
    pub channel: String,
    pub user: String,
}

pub struct SlackBot {
    client: SlackClient,
    bot_user_id: OnceCell<String>,
}

impl SlackBot {
    pub fn new(client: SlackClient) -> Self {
        Self {
            client,
            bot_user_id: OnceCell::new(),
        }
    }

    /// Resolved once through `auth.test`, then reused.
    pub async fn bot_user_id(&self) -> Result<&str, SlackError> {
        self.bot_user_id
            .get_or_try_init(|| self.client.auth_test())
            .await
            .map(String::as_str)
    }

    /// The message with the mention stripped, if `event` is a plain user
    /// message that mentions the bot.
    pub async fn mention(&self, event: &MessageEvent) -> Result<Option<Mention>, SlackError> {
        if event.kind != "message" || event.subtype.is_some() {
            return Ok(None);
        }
        let (Some(text), Some(channel), Some(user)) = (&event.text, &event.channel, &event.user)
        else {
            return Ok(None);
        };

        let tag = format!("<@{}>", self.bot_user_id().await?);
        if !text.contains(&tag) {
            return Ok(None);
        }

        Ok(Some(Mention {
            text: text.replace(&tag, "").trim().to_string(),
            channel: channel.clone(),
            user: user.clone(),
        }))
    }

    /// Answer a mention in its channel and record the outcome in the log store.
    pub async fn respond(&self, assistant: Arc<dyn Assistant>, db: Database, mention: Mention) {
        let (reply, _) = reply_or_fallback(assistant.as_ref(), &mention.text).await;
        let text = format!("<@{}> {}", mention.user, reply);

        let entry = match self.client.post_message(&mention.channel, &text).await {
            Ok(()) => CreateLogInput::new(
                LogLevel::Info,
                format!(
                    "Response sent to {} in channel {}",
                    mention.user, mention.channel
                ),
                Some(SLACK_PIPELINE),
            ),
            Err(e) => {
                tracing::error!("Error sending Slack message: {}", e);
                CreateLogInput::new(
                    LogLevel::Error,
                    format!("Slack API error: {}", e),
                    Some(SLACK_PIPELINE),
                )
            }
        };

        if let Err(e) = db.insert_log(entry) {
            tracing::warn!("Failed to record Slack outcome: {:#}", e);
        }
    }
}

/// Log line for an incoming mention.
pub fn received_log(mention: &Mention) -> CreateLogInput {
    CreateLogInput::new(
        LogLevel::Info,
        format!(
            "Slack message from {}: {}",
            mention.user,
            redact_message(&mention.text)
        ),
        Some(SLACK_PIPELINE),
    )
}
