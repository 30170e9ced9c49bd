//! Channel repository

use sqlx::SqlitePool;

use super::{parse_db_timestamp, RepositoryError, RepositoryResult};
use crate::models::{Channel, NewChannel};

#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    name: String,
    username: Option<String>,
    subscribers: i64,
    created_at: String,
}

pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_channel(&self, channel: &NewChannel) -> RepositoryResult<Channel> {
        let result = sqlx::query(
            r#"
            INSERT INTO channels (id, name, username, subscribers, created_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(channel.id)
        .bind(&channel.name)
        .bind(&channel.username)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ChannelExists(channel.id));
        }

        self.get_channel(channel.id).await
    }

    /// Delete a channel that nobody is subscribed to
    pub async fn delete_channel(&self, id: i64) -> RepositoryResult<()> {
        let channel = self.get_channel(id).await?;
        if channel.subscribers > 0 {
            return Err(RepositoryError::ChannelHasSubscribers(id));
        }

        sqlx::query("DELETE FROM channels WHERE id = ? AND subscribers = 0")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_channel(&self, id: i64) -> RepositoryResult<Channel> {
        self.find_channel(id)
            .await?
            .ok_or(RepositoryError::ChannelNotFound(id))
    }

    pub async fn find_channel(&self, id: i64) -> RepositoryResult<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, username, subscribers, created_at
            FROM channels
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_channel))
    }

    pub async fn list_channels(&self) -> RepositoryResult<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, username, subscribers, created_at
            FROM channels
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_channel).collect())
    }

    /// Channels with at least one subscriber; these are the ones to scrape
    pub async fn list_active_channels(&self) -> RepositoryResult<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, username, subscribers, created_at
            FROM channels
            WHERE subscribers > 0
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_channel).collect())
    }

    pub async fn count(&self) -> RepositoryResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM channels")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

fn row_to_channel(row: ChannelRow) -> Channel {
    Channel {
        id: row.id,
        name: row.name,
        username: row.username,
        subscribers: row.subscribers,
        created_at: parse_db_timestamp(&row.created_at),
    }
}
