//! User repository
//!
//! Owns the `user_channels` relation and keeps `channels.subscribers` equal to
//! the number of subscription rows for each channel.

use sqlx::{Sqlite, SqlitePool, Transaction};

use super::{parse_db_timestamp, RepositoryError, RepositoryResult};
use crate::models::{User, UserChannel};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    created_at: String,
}

/// Effect of an `update_user_channels` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Channels the user was newly subscribed to
    pub added: Vec<i64>,
    /// Channels the user was unsubscribed from
    pub removed: Vec<i64>,
    /// Added channels whose counter went from 0 to 1
    pub activated: Vec<i64>,
    /// Removed channels whose counter dropped to 0
    pub orphaned: Vec<i64>,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, id: i64, name: &str) -> RepositoryResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::UserExists(id));
        }

        self.get_user(id).await
    }

    /// Delete a user and all of their subscriptions.
    ///
    /// Returns the ids of channels left without subscribers.
    pub async fn delete_user(&self, id: i64) -> RepositoryResult<Vec<i64>> {
        let mut tx = self.pool.begin().await?;

        ensure_user(&mut tx, id).await?;

        let channel_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT channel_id FROM user_channels WHERE user_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let mut orphaned = Vec::new();
        for (channel_id,) in channel_ids {
            sqlx::query("DELETE FROM user_channels WHERE user_id = ? AND channel_id = ?")
                .bind(id)
                .bind(channel_id)
                .execute(&mut *tx)
                .await?;
            if decrement_subscribers(&mut tx, channel_id).await? == 0 {
                orphaned.push(channel_id);
            }
        }

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(orphaned)
    }

    /// Subscribe the user to `add` and unsubscribe from `remove` in one transaction.
    ///
    /// Adding a channel the user already has, or removing one they do not
    /// have, is a no-op.
    pub async fn update_user_channels(
        &self,
        user_id: i64,
        add: &[i64],
        remove: &[i64],
    ) -> RepositoryResult<SubscriptionChanges> {
        let mut tx = self.pool.begin().await?;
        let mut changes = SubscriptionChanges::default();

        ensure_user(&mut tx, user_id).await?;

        for &channel_id in add {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM channels WHERE id = ?")
                .bind(channel_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(RepositoryError::ChannelNotFound(channel_id));
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO user_channels (user_id, channel_id)
                VALUES (?, ?)
                ON CONFLICT(user_id, channel_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() > 0 {
                let subscribers: (i64,) = sqlx::query_as(
                    "UPDATE channels SET subscribers = subscribers + 1 WHERE id = ? RETURNING subscribers",
                )
                .bind(channel_id)
                .fetch_one(&mut *tx)
                .await?;
                changes.added.push(channel_id);
                if subscribers.0 == 1 {
                    changes.activated.push(channel_id);
                }
            }
        }

        for &channel_id in remove {
            let deleted =
                sqlx::query("DELETE FROM user_channels WHERE user_id = ? AND channel_id = ?")
                    .bind(user_id)
                    .bind(channel_id)
                    .execute(&mut *tx)
                    .await?;

            if deleted.rows_affected() > 0 {
                changes.removed.push(channel_id);
                if decrement_subscribers(&mut tx, channel_id).await? == 0 {
                    changes.orphaned.push(channel_id);
                }
            }
        }

        tx.commit().await?;
        Ok(changes)
    }

    pub async fn get_user(&self, id: i64) -> RepositoryResult<User> {
        self.find_user(id)
            .await?
            .ok_or(RepositoryError::UserNotFound(id))
    }

    pub async fn find_user(&self, id: i64) -> RepositoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|row| User {
            id: row.id,
            name: row.name,
            created_at: parse_db_timestamp(&row.created_at),
        }))
    }

    /// Ids of the channels the user is subscribed to
    pub async fn get_user_channels(&self, id: i64) -> RepositoryResult<Vec<i64>> {
        Ok(self
            .get_user_channel_details(id)
            .await?
            .into_iter()
            .map(|channel| channel.id)
            .collect())
    }

    /// Id and title of each channel the user is subscribed to, ordered by title
    pub async fn get_user_channel_details(&self, id: i64) -> RepositoryResult<Vec<UserChannel>> {
        self.get_user(id).await?;

        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT c.id, c.name
            FROM user_channels uc
            JOIN channels c ON c.id = uc.channel_id
            WHERE uc.user_id = ?
            ORDER BY c.name, c.id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| UserChannel { id, name })
            .collect())
    }

    pub async fn count(&self) -> RepositoryResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

async fn ensure_user(tx: &mut Transaction<'_, Sqlite>, id: i64) -> RepositoryResult<()> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    exists.map(|_| ()).ok_or(RepositoryError::UserNotFound(id))
}

async fn decrement_subscribers(
    tx: &mut Transaction<'_, Sqlite>,
    channel_id: i64,
) -> RepositoryResult<i64> {
    let subscribers: (i64,) = sqlx::query_as(
        "UPDATE channels SET subscribers = MAX(subscribers - 1, 0) WHERE id = ? RETURNING subscribers",
    )
    .bind(channel_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(subscribers.0)
}
