//! Telegram channel (source) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel that at least one user registered as a source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    /// Telegram chat id (negative for channels)
    pub id: i64,
    /// Channel title
    pub name: String,
    /// Public username, needed to read the channel's web preview
    pub username: Option<String>,
    /// Number of users subscribed to this channel
    pub subscribers: i64,
    pub created_at: DateTime<Utc>,
}

/// Data needed to create a channel row
#[derive(Debug, Clone, PartialEq)]
pub struct NewChannel {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
}

impl NewChannel {
    pub fn new(id: i64, name: impl Into<String>, username: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            username,
        }
    }
}
