//! Outbound chat API.
//!
//! [`ChatSender`] is the only capability the relay needs from the messaging
//! platform: deliver one text message to one chat. [`TelegramClient`]
//! implements it over the Telegram Bot API `sendMessage` method.

use std::time::Duration;

use async_trait::async_trait;
use relay_common::config::TelegramConfig;
use relay_common::error::RelayError;
use relay_common::types::ChatId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Markup mode for every outbound message.
const PARSE_MODE_HTML: &str = "HTML";

/// An HTML-formatted text message to deliver to one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub disable_link_preview: bool,
}

impl OutgoingMessage {
    /// HTML text with link previews disabled.
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            disable_link_preview: true,
        }
    }
}

/// Sends text messages to chat recipients.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Deliver `message` to `chat_id`. One attempt, no retry.
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> Result<(), RelayError>;
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ChatId,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    disable_web_page_preview: bool,
}

/// Envelope shared by every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, RelayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.method_url(method)).json(body);

        // The request URL embeds the token, so transport errors are stripped of it.
        let response = request.send().await.map_err(|e| e.without_url())?;
        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| e.without_url())?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(RelayError::ChatApi {
                code: error_code.or(Some(status.as_u16())),
                description: description
                    .unwrap_or_else(|| format!("{} returned no result", method)),
            }),
        }
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> Result<(), RelayError> {
        let body = SendMessageRequest {
            chat_id,
            text: &message.text,
            parse_mode: PARSE_MODE_HTML,
            disable_web_page_preview: message.disable_link_preview,
        };
        let _sent: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}
