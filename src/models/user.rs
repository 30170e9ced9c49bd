//! Bot user model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Telegram user registered with the service.
///
/// `id` is the Telegram user id, which is also the private chat id used to
/// deliver answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Channel as seen from one user's source list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserChannel {
    pub id: i64,
    pub name: String,
}
