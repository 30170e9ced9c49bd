//! Test fixtures for common test data
//!
//! Fixtures provide pre-defined configuration and Telegram updates that can be
//! used across multiple tests.

use uuid::Uuid;

use telerag::config::{AppConfig, DatabaseConfig, LoggingConfig, ServerConfig};
use telerag::models::{CallbackQuery, Chat, ChatType, Message, TgUser, Update};

/// Fixed ids for testing (reproducible tests)
pub mod ids {
    pub const BOT_ID: i64 = 7_000_000_001;
    pub const ALICE: i64 = 1001;
    pub const BOB: i64 = 1002;
    pub const NEWS_CHANNEL: i64 = -1_001_000_000_001;
    pub const TECH_CHANNEL: i64 = -1_001_000_000_002;
}

/// Create a test configuration with a temporary SQLite database
pub fn test_config() -> AppConfig {
    // Use a unique temp file for each test to avoid conflicts
    let db_path = format!(
        "/tmp/telerag_test_{}.db",
        Uuid::new_v4().to_string().replace('-', "")
    );

    let mut config = AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            enabled: false,
        },
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 30,
        },
        logging: LoggingConfig::default(),
        ..AppConfig::default()
    };
    config.bot.token = "123456:TEST".to_string();
    config.bot.items_per_page = 2;
    config.scraper.history_limit = 10;
    config.scraper.poll_interval_secs = 3600;
    config.vector_store.data_dir = None;
    config.embedding.dims = 64;
    config.rag.n_result = 3;
    config
}

/// Telegram user fixtures
pub struct UserFixtures;

impl UserFixtures {
    pub fn alice() -> TgUser {
        Self::user(ids::ALICE, "Alice")
    }

    pub fn bob() -> TgUser {
        Self::user(ids::BOB, "Bob")
    }

    pub fn user(id: i64, first_name: &str) -> TgUser {
        TgUser {
            id,
            is_bot: false,
            first_name: first_name.to_string(),
            last_name: None,
            username: None,
        }
    }
}

/// Chat fixtures
pub struct ChatFixtures;

impl ChatFixtures {
    pub fn private(user_id: i64) -> Chat {
        Chat {
            id: user_id,
            kind: ChatType::Private,
            title: None,
            username: None,
            first_name: None,
        }
    }

    pub fn channel(id: i64, title: &str, username: &str) -> Chat {
        Chat {
            id,
            kind: ChatType::Channel,
            title: Some(title.to_string()),
            username: Some(username.to_string()),
            first_name: None,
        }
    }

    pub fn group(id: i64, title: &str, username: &str) -> Chat {
        Chat {
            id,
            kind: ChatType::Supergroup,
            title: Some(title.to_string()),
            username: Some(username.to_string()),
            first_name: None,
        }
    }
}

/// Builders for incoming updates
pub struct UpdateFixtures;

impl UpdateFixtures {
    /// A text message sent by `from` in their private chat with the bot
    pub fn text(update_id: i64, from: &TgUser, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id,
                from: Some(from.clone()),
                chat: ChatFixtures::private(from.id),
                date: 1_700_000_000,
                text: Some(text.to_string()),
            }),
            callback_query: None,
        }
    }

    /// A message without text (photo, sticker...)
    pub fn non_text(update_id: i64, from: &TgUser) -> Update {
        let mut update = Self::text(update_id, from, "");
        if let Some(message) = update.message.as_mut() {
            message.text = None;
        }
        update
    }

    /// A text message posted in a group chat
    pub fn group_text(update_id: i64, from: &TgUser, text: &str) -> Update {
        let mut update = Self::text(update_id, from, text);
        if let Some(message) = update.message.as_mut() {
            message.chat = ChatFixtures::group(-500, "Group", "group");
        }
        update
    }

    /// A button press on a bot message with id `message_id`
    pub fn callback(update_id: i64, from: &TgUser, message_id: i64, data: &str) -> Update {
        Update {
            update_id,
            message: None,
            callback_query: Some(CallbackQuery {
                id: format!("cb-{}", update_id),
                from: from.clone(),
                message: Some(Message {
                    message_id,
                    from: None,
                    chat: ChatFixtures::private(from.id),
                    date: 1_700_000_000,
                    text: Some("menu".to_string()),
                }),
                data: Some(data.to_string()),
            }),
        }
    }
}
