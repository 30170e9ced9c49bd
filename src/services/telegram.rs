//! Telegram Bot API client
//!
//! Every method is a JSON `POST {api_url}/bot{token}/{method}`; the response
//! envelope is decoded into [`ApiResponse`] and `ok = false` becomes
//! [`TelegramError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::config::BotConfig;
use crate::models::{
    ApiResponse, BotCommand, Chat, ChatRef, InlineKeyboardMarkup, Message, ReplyMarkup, TgUser,
    Update,
};

/// Errors returned by the Bot API client
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram API error {code}: {description}")]
    Api {
        code: i32,
        description: String,
        retry_after: Option<u64>,
    },

    #[error("Telegram API returned no result for {0}")]
    MissingResult(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TelegramError {
    /// True for "message is not modified" responses to edits with unchanged content
    pub fn is_not_modified(&self) -> bool {
        matches!(self, TelegramError::Api { description, .. } if description.contains("message is not modified"))
    }

    fn is_chat_not_found(&self) -> bool {
        matches!(self, TelegramError::Api { code: 400, description, .. } if description.contains("chat not found"))
    }
}

pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

/// Operations of the Bot API used by the bot
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_me(&self) -> TelegramResult<TgUser>;

    /// Long-poll for updates with id >= `offset`
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> TelegramResult<Message>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> TelegramResult<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()>;

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> TelegramResult<()>;

    async fn set_my_commands(&self, commands: &[BotCommand]) -> TelegramResult<()>;

    /// Look up a chat; `None` when Telegram reports it does not exist
    async fn get_chat(&self, chat: ChatRef) -> TelegramResult<Option<Chat>>;
}

/// reqwest based Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &BotConfig) -> TelegramResult<Self> {
        // Must outlive the long-polling timeout
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
        })
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> TelegramResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("Telegram: calling {}", method);
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(params)
            .send()
            .await?;

        let envelope: ApiResponse<T> = response.json().await?;
        if !envelope.ok {
            return Err(TelegramError::Api {
                code: envelope.error_code.unwrap_or_default(),
                description: envelope.description.unwrap_or_default(),
                retry_after: envelope.parameters.and_then(|p| p.retry_after),
            });
        }

        envelope
            .result
            .ok_or_else(|| TelegramError::MissingResult(method.to_string()))
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_me(&self) -> TelegramResult<TgUser> {
        self.call("getMe", &json!({})).await
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> TelegramResult<Message> {
        let mut params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = markup {
            params["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", &params).await
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> TelegramResult<()> {
        let mut params = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = markup {
            params["reply_markup"] = serde_json::to_value(markup)?;
        }
        // Result is either the edited message or `true`
        let _: serde_json::Value = self.call("editMessageText", &params).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> TelegramResult<()> {
        let mut params = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> TelegramResult<()> {
        let _: bool = self
            .call("setMyCommands", &json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    async fn get_chat(&self, chat: ChatRef) -> TelegramResult<Option<Chat>> {
        match self.call("getChat", &json!({ "chat_id": chat })).await {
            Ok(chat) => Ok(Some(chat)),
            Err(e) if e.is_chat_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
