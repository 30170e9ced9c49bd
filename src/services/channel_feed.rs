//! Public channel feed
//!
//! Reads posts of public Telegram channels from the web preview at
//! `{base}/s/{username}`. Older pages are reached with `?before=<post id>`.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::config::ScraperConfig;
use crate::utils::text::html_to_text;

static POST_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-post="[^"/]+/(\d+)""#).expect("valid post regex"));

static POST_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="tgme_widget_message_text js-message_text[^"]*"[^>]*>(.*?)</div>"#)
        .expect("valid text regex")
});

const CHANNEL_MARKER: &str = "tgme_channel_info";

/// A text post of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPost {
    pub id: i64,
    pub text: String,
}

/// One page of the channel preview
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Text posts, oldest first
    pub posts: Vec<ChannelPost>,
    /// Smallest post id on the page, including posts without text
    pub oldest_id: Option<i64>,
    /// Largest post id on the page, including posts without text
    pub newest_id: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Channel @{0} has no public preview")]
    NotReadable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Source of public channel posts
#[async_trait]
pub trait ChannelFeed: Send + Sync {
    /// Most recent page of posts
    async fn latest(&self, username: &str) -> FeedResult<FeedPage>;

    /// Page of posts older than `post_id`
    async fn before(&self, username: &str, post_id: i64) -> FeedResult<FeedPage>;
}

/// Feed backed by the `t.me/s/` web preview
#[derive(Clone)]
pub struct WebPreviewFeed {
    client: Client,
    base_url: String,
}

impl WebPreviewFeed {
    pub fn new(config: &ScraperConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("telerag/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.feed_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, username: &str, url: String) -> FeedResult<FeedPage> {
        debug!("Channel feed: GET {}", url);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_page(&body).ok_or_else(|| FeedError::NotReadable(username.to_string()))
    }
}

#[async_trait]
impl ChannelFeed for WebPreviewFeed {
    async fn latest(&self, username: &str) -> FeedResult<FeedPage> {
        let url = format!("{}/s/{}", self.base_url, username);
        self.fetch(username, url).await
    }

    async fn before(&self, username: &str, post_id: i64) -> FeedResult<FeedPage> {
        let url = format!("{}/s/{}?before={}", self.base_url, username, post_id);
        self.fetch(username, url).await
    }
}

/// Parse a preview page. `None` when the page is not a channel preview.
pub fn parse_page(html: &str) -> Option<FeedPage> {
    let anchors: Vec<(usize, i64)> = POST_ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let id = caps[1].parse().ok()?;
            Some((start, id))
        })
        .collect();

    if anchors.is_empty() && !html.contains(CHANNEL_MARKER) {
        return None;
    }

    let mut page = FeedPage::default();
    for (index, &(start, id)) in anchors.iter().enumerate() {
        let end = anchors
            .get(index + 1)
            .map(|&(next, _)| next)
            .unwrap_or(html.len());

        page.oldest_id = Some(page.oldest_id.map_or(id, |oldest| oldest.min(id)));
        page.newest_id = Some(page.newest_id.map_or(id, |newest| newest.max(id)));

        let Some(caps) = POST_TEXT.captures(&html[start..end]) else {
            continue;
        };
        let text = html_to_text(&caps[1]);
        if !text.is_empty() {
            page.posts.push(ChannelPost { id, text });
        }
    }

    page.posts.sort_by_key(|post| post.id);
    page.posts.dedup_by_key(|post| post.id);
    Some(page)
}
