//! Messages exchanged between the scraper, the RAG client and the bot

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scraper subscription action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapSignal {
    Subscribe,
    Unsubscribe,
}

/// Instruction for the scraper to start or stop following a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub channel_id: i64,
    pub title: String,
    pub username: Option<String>,
    pub action: ScrapSignal,
}

impl ChannelRecord {
    pub fn subscribe(channel_id: i64, title: impl Into<String>, username: Option<String>) -> Self {
        Self {
            channel_id,
            title: title.into(),
            username,
            action: ScrapSignal::Subscribe,
        }
    }

    pub fn unsubscribe(channel_id: i64) -> Self {
        Self {
            channel_id,
            title: String::new(),
            username: None,
            action: ScrapSignal::Unsubscribe,
        }
    }
}

/// A text post read from a channel, waiting to be indexed
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedMessage {
    pub channel_id: i64,
    pub channel_name: String,
    pub text: String,
}

/// A user's question scoped to their channels
#[derive(Debug, Clone, PartialEq)]
pub struct RagRequest {
    pub id: Uuid,
    pub user_id: i64,
    pub request: String,
    pub channel_ids: Vec<i64>,
}

impl RagRequest {
    pub fn new(user_id: i64, request: impl Into<String>, channel_ids: Vec<i64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            request: request.into(),
            channel_ids,
        }
    }
}

/// Generated answer to be delivered to a user
#[derive(Debug, Clone, PartialEq)]
pub struct RagResponse {
    pub request_id: Uuid,
    pub user_id: i64,
    pub text: String,
}
