//! Source subscriptions
//!
//! Keeps the database, the scraper and the vector store consistent: a channel
//! is scraped while it has at least one subscriber, and its row and collection
//! are removed when the last subscriber leaves.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::db::{ChannelRepository, DbPool, RepositoryError, UserRepository};
use crate::models::{NewChannel, UserChannel};
use crate::services::rag::RagHandle;
use crate::services::scraper::ScraperHandle;

/// Result of adding a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadySubscribed,
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: DbPool,
    scraper: ScraperHandle,
    rag: RagHandle,
}

impl SubscriptionService {
    pub fn new(pool: DbPool, scraper: ScraperHandle, rag: RagHandle) -> Self {
        Self { pool, scraper, rag }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Subscribe a user to a channel, registering both if needed
    pub async fn add_source(
        &self,
        user_id: i64,
        user_name: &str,
        channel: &NewChannel,
    ) -> Result<AddOutcome> {
        let users = UserRepository::new(&self.pool);
        let channels = ChannelRepository::new(&self.pool);

        if users.find_user(user_id).await?.is_none() {
            match users.create_user(user_id, user_name).await {
                Ok(_) => info!("Registered user {} ({})", user_id, user_name),
                Err(RepositoryError::UserExists(_)) => {}
                Err(e) => return Err(e).context("Failed to register user"),
            }
        }

        if channels.find_channel(channel.id).await?.is_none() {
            match channels.create_channel(channel).await {
                Ok(_) => info!("Registered channel {} ({})", channel.id, channel.name),
                Err(RepositoryError::ChannelExists(_)) => {}
                Err(e) => return Err(e).context("Failed to register channel"),
            }
        }

        let changes = users
            .update_user_channels(user_id, &[channel.id], &[])
            .await
            .context("Failed to subscribe user")?;

        if changes.added.is_empty() {
            return Ok(AddOutcome::AlreadySubscribed);
        }

        if changes.activated.contains(&channel.id) {
            let username = match channels.get_channel(channel.id).await {
                Ok(stored) => stored.username.or_else(|| channel.username.clone()),
                Err(_) => channel.username.clone(),
            };
            if let Err(e) = self
                .scraper
                .subscribe(channel.id, &channel.name, username)
                .await
            {
                warn!("Failed to start scraping channel {}: {:#}", channel.id, e);
            }
        }

        info!("User {} subscribed to channel {}", user_id, channel.id);
        Ok(AddOutcome::Added)
    }

    /// Unsubscribe a user from a channel. Returns false if they were not subscribed.
    pub async fn remove_source(&self, user_id: i64, channel_id: i64) -> Result<bool> {
        let changes = match UserRepository::new(&self.pool)
            .update_user_channels(user_id, &[], &[channel_id])
            .await
        {
            Ok(changes) => changes,
            Err(RepositoryError::UserNotFound(_)) => return Ok(false),
            Err(e) => return Err(e).context("Failed to unsubscribe user"),
        };

        for orphan in &changes.orphaned {
            self.drop_channel(*orphan).await;
        }

        if !changes.removed.is_empty() {
            info!("User {} unsubscribed from channel {}", user_id, channel_id);
        }
        Ok(!changes.removed.is_empty())
    }

    /// Delete a user and their subscriptions. Returns false for unknown users.
    pub async fn delete_account(&self, user_id: i64) -> Result<bool> {
        let orphaned = match UserRepository::new(&self.pool).delete_user(user_id).await {
            Ok(orphaned) => orphaned,
            Err(RepositoryError::UserNotFound(_)) => return Ok(false),
            Err(e) => return Err(e).context("Failed to delete user"),
        };

        for orphan in orphaned {
            self.drop_channel(orphan).await;
        }

        info!("Deleted user {}", user_id);
        Ok(true)
    }

    /// Channels of a user; `None` for unknown users
    pub async fn user_channels(&self, user_id: i64) -> Result<Option<Vec<UserChannel>>> {
        match UserRepository::new(&self.pool)
            .get_user_channel_details(user_id)
            .await
        {
            Ok(channels) => Ok(Some(channels)),
            Err(RepositoryError::UserNotFound(_)) => Ok(None),
            Err(e) => Err(e).context("Failed to load user channels"),
        }
    }

    /// Stop scraping a channel without subscribers and forget its data
    async fn drop_channel(&self, channel_id: i64) {
        if let Err(e) = ChannelRepository::new(&self.pool)
            .delete_channel(channel_id)
            .await
        {
            warn!("Failed to delete channel {}: {}", channel_id, e);
        }
        if let Err(e) = self.scraper.unsubscribe(channel_id).await {
            warn!("Failed to stop scraping channel {}: {:#}", channel_id, e);
        }
        if let Err(e) = self.rag.delete_channel(channel_id).await {
            warn!("Failed to delete collection of channel {}: {:#}", channel_id, e);
        }
    }
}
