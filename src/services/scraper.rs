//! Channel scraper
//!
//! A single background task owns the set of tracked channels. On subscribe it
//! reads the channel's recent history, afterwards it polls every tracked
//! channel for posts newer than the last one seen. Text posts are pushed to the
//! RAG ingestion queue as [`ScrapedMessage`]s.
//!
//! Other components talk to the task only through [`ScraperHandle`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ScraperConfig;
use crate::db::{ChannelRepository, DbPool};
use crate::models::{ChannelRecord, ScrapSignal, ScrapedMessage};
use crate::services::channel_feed::{ChannelFeed, ChannelPost, FeedError};

enum ScraperCommand {
    Update {
        records: Vec<ChannelRecord>,
        done: oneshot::Sender<()>,
    },
    Tracked {
        reply: oneshot::Sender<Vec<i64>>,
    },
}

/// Cloneable handle to the scraper task
#[derive(Clone)]
pub struct ScraperHandle {
    commands: mpsc::Sender<ScraperCommand>,
}

impl ScraperHandle {
    /// Apply subscribe/unsubscribe records and wait until they are processed
    pub async fn update(&self, records: Vec<ChannelRecord>) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(ScraperCommand::Update { records, done })
            .await
            .map_err(|_| anyhow!("Scraper is not running"))?;
        wait.await.map_err(|_| anyhow!("Scraper stopped before finishing the update"))
    }

    pub async fn subscribe(&self, channel_id: i64, title: &str, username: Option<String>) -> Result<()> {
        self.update(vec![ChannelRecord::subscribe(channel_id, title, username)])
            .await
    }

    pub async fn unsubscribe(&self, channel_id: i64) -> Result<()> {
        self.update(vec![ChannelRecord::unsubscribe(channel_id)]).await
    }

    /// Ids of the channels currently tracked
    pub async fn tracked_channels(&self) -> Result<Vec<i64>> {
        let (reply, wait) = oneshot::channel();
        self.commands
            .send(ScraperCommand::Tracked { reply })
            .await
            .map_err(|_| anyhow!("Scraper is not running"))?;
        wait.await.map_err(|_| anyhow!("Scraper stopped before replying"))
    }

    /// Subscribe to every channel that has subscribers in the database
    pub async fn sync_subscriptions(&self, pool: &DbPool) -> Result<usize> {
        let channels = ChannelRepository::new(pool)
            .list_active_channels()
            .await
            .context("Failed to load active channels")?;

        let records: Vec<ChannelRecord> = channels
            .into_iter()
            .map(|c| ChannelRecord::subscribe(c.id, c.name, c.username))
            .collect();
        let count = records.len();

        self.update(records).await?;
        Ok(count)
    }
}

struct TrackedChannel {
    title: String,
    username: String,
    last_post_id: i64,
}

struct Scraper {
    feed: Arc<dyn ChannelFeed>,
    config: ScraperConfig,
    output: mpsc::Sender<ScrapedMessage>,
    channels: HashMap<i64, TrackedChannel>,
}

/// Spawn the scraper task; it runs until `cancel` fires
pub fn start_scraper(
    feed: Arc<dyn ChannelFeed>,
    config: ScraperConfig,
    output: mpsc::Sender<ScrapedMessage>,
    cancel: CancellationToken,
) -> (ScraperHandle, JoinHandle<()>) {
    let (commands, receiver) = mpsc::channel(64);
    let scraper = Scraper {
        feed,
        config,
        output,
        channels: HashMap::new(),
    };

    let task = tokio::spawn(scraper.run(receiver, cancel));
    info!("Scraper started");
    (ScraperHandle { commands }, task)
}

impl Scraper {
    async fn run(mut self, mut commands: mpsc::Receiver<ScraperCommand>, cancel: CancellationToken) {
        let period = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(ScraperCommand::Update { records, done }) => {
                        self.update(records).await;
                        let _ = done.send(());
                    }
                    Some(ScraperCommand::Tracked { reply }) => {
                        let mut ids: Vec<i64> = self.channels.keys().copied().collect();
                        ids.sort_unstable();
                        let _ = reply.send(ids);
                    }
                    None => break,
                },
                _ = ticker.tick() => self.poll().await,
            }
        }

        info!("Scraper stopped");
    }

    async fn update(&mut self, records: Vec<ChannelRecord>) {
        for record in records {
            let result = match record.action {
                ScrapSignal::Subscribe => self.subscribe(record).await,
                ScrapSignal::Unsubscribe => {
                    self.unsubscribe(record.channel_id);
                    Ok(())
                }
            };
            if let Err(e) = result {
                error!("Scraper update failed: {:#}", e);
            }
        }
    }

    async fn subscribe(&mut self, record: ChannelRecord) -> Result<()> {
        if self.channels.contains_key(&record.channel_id) {
            info!("Channel {} is already tracked", record.channel_id);
            return Ok(());
        }

        let Some(username) = record.username else {
            warn!(
                "Channel {} ({}) has no public username, skipping",
                record.channel_id, record.title
            );
            return Ok(());
        };

        let (history, newest_id) = match self.fetch_history(&username).await {
            Ok(result) => result,
            Err(FeedError::NotReadable(_)) => {
                warn!("Channel @{} is not readable, skipping", username);
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read history of @{}", username))
            }
        };

        info!(
            "Tracking channel {} (@{}), {} historical posts",
            record.channel_id,
            username,
            history.len()
        );

        self.channels.insert(
            record.channel_id,
            TrackedChannel {
                title: record.title,
                username,
                last_post_id: newest_id,
            },
        );

        self.emit(record.channel_id, history).await;
        Ok(())
    }

    fn unsubscribe(&mut self, channel_id: i64) {
        match self.channels.remove(&channel_id) {
            Some(channel) => info!("Stopped tracking channel {} (@{})", channel_id, channel.username),
            None => info!("Channel {} is not tracked", channel_id),
        }
    }

    /// Up to `history_limit` most recent text posts, oldest first, and the newest post id
    async fn fetch_history(&self, username: &str) -> Result<(Vec<ChannelPost>, i64), FeedError> {
        let limit = self.config.history_limit;
        let first = self.feed.latest(username).await?;
        let newest_id = first.newest_id.unwrap_or(0);

        let mut posts = first.posts;
        let mut oldest = first.oldest_id;

        while posts.len() < limit {
            let Some(before) = oldest.filter(|&id| id > 1) else {
                break;
            };
            let page = match self.feed.before(username, before).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Stopped reading history of @{} at post {}: {}", username, before, e);
                    break;
                }
            };
            match page.oldest_id {
                Some(id) if id < before => oldest = Some(id),
                _ => break,
            }
            let mut older = page.posts;
            older.retain(|post| post.id < before);
            older.append(&mut posts);
            posts = older;
        }

        if posts.len() > limit {
            posts.drain(..posts.len() - limit);
        }
        Ok((posts, newest_id))
    }

    async fn poll(&mut self) {
        let ids: Vec<i64> = self.channels.keys().copied().collect();
        for channel_id in ids {
            let Some(channel) = self.channels.get(&channel_id) else {
                continue;
            };
            let username = channel.username.clone();
            let last_post_id = channel.last_post_id;

            let page = match self.feed.latest(&username).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Failed to poll @{}: {}", username, e);
                    continue;
                }
            };

            let fresh: Vec<ChannelPost> = page
                .posts
                .into_iter()
                .filter(|post| post.id > last_post_id)
                .collect();

            if let Some(channel) = self.channels.get_mut(&channel_id) {
                channel.last_post_id = page.newest_id.unwrap_or(0).max(last_post_id);
            }

            if !fresh.is_empty() {
                debug!("{} new posts in @{}", fresh.len(), username);
                self.emit(channel_id, fresh).await;
            }
        }
    }

    async fn emit(&self, channel_id: i64, posts: Vec<ChannelPost>) {
        let channel_name = self
            .channels
            .get(&channel_id)
            .map(|c| c.title.clone())
            .unwrap_or_default();

        for post in posts {
            let message = ScrapedMessage {
                channel_id,
                channel_name: channel_name.clone(),
                text: post.text,
            };
            if self.output.send(message).await.is_err() {
                warn!("Ingestion queue closed, dropping posts of channel {}", channel_id);
                return;
            }
        }
    }
}
