//! Service wiring and lifecycle
//!
//! Start order: database, vector store, RAG loops, scraper (resynchronised
//! from the database), bot, HTTP server. Shutdown runs in the order bot,
//! scraper, RAG, HTTP so that no component outlives the one feeding it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bot::{start_bot, BotApp};
use crate::config::AppConfig;
use crate::db;
use crate::services::channel_feed::{ChannelFeed, WebPreviewFeed};
use crate::services::embedding::{build_embedder, Embedder};
use crate::services::llm::{ChatModel, LlmClient};
use crate::services::rag::{start_rag, RagClient};
use crate::services::scraper::start_scraper;
use crate::services::subscriptions::SubscriptionService;
use crate::services::telegram::{BotApi, TelegramClient};
use crate::services::vector_store::{build_vector_store, VectorStore};
use crate::{api, AppState};

/// External collaborators of the service
pub struct Components {
    pub bot_api: Arc<dyn BotApi>,
    pub feed: Arc<dyn ChannelFeed>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn ChatModel>,
    pub vector_store: Arc<dyn VectorStore>,
}

impl Components {
    /// Build the network clients and the vector store from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            bot_api: Arc::new(
                TelegramClient::new(&config.bot).context("Failed to create Telegram client")?,
            ),
            feed: Arc::new(
                WebPreviewFeed::new(&config.scraper).context("Failed to create channel feed")?,
            ),
            embedder: build_embedder(&config.embedding)?,
            llm: Arc::new(LlmClient::new(&config.llm)?),
            vector_store: build_vector_store(&config.vector_store)
                .await
                .context("Failed to open vector store")?,
        })
    }
}

struct Stage {
    name: &'static str,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Stage {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    async fn stop(self) -> &'static str {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("{} task failed: {}", self.name, e);
            }
        }
        info!("{} stopped", self.name);
        self.name
    }
}

pub struct TeleRagService {
    config: AppConfig,
    bot: Stage,
    scraper: Stage,
    rag: Stage,
    http: Stage,
    local_addr: Option<SocketAddr>,
}

impl TeleRagService {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            bot: Stage::new("Bot"),
            scraper: Stage::new("Scraper"),
            rag: Stage::new("RAG"),
            http: Stage::new("HTTP server"),
            local_addr: None,
        }
    }

    /// Address the HTTP server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Start with clients built from the configuration
    pub async fn start(&mut self) -> Result<()> {
        let components = Components::from_config(&self.config).await?;
        self.start_with(components).await
    }

    pub async fn start_with(&mut self, components: Components) -> Result<()> {
        info!("Starting TeleRagService...");

        info!("Initializing database connection");
        let pool = db::init_pool(&self.config.database)
            .await
            .context("Failed to initialize database")?;

        let capacity = self.config.rag.queue_capacity.max(1);
        let (message_tx, message_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::channel(capacity);

        let rag_client = Arc::new(RagClient::new(
            components.vector_store.clone(),
            components.embedder,
            components.llm,
            self.config.rag.clone(),
        ));
        let (rag, rag_tasks) =
            start_rag(rag_client, message_rx, response_tx, self.rag.cancel.clone());
        self.rag.tasks = rag_tasks;

        let (scraper, scraper_task) = start_scraper(
            components.feed,
            self.config.scraper.clone(),
            message_tx,
            self.scraper.cancel.clone(),
        );
        self.scraper.tasks.push(scraper_task);

        // Scraper state lives in memory only; rebuild it from the database
        {
            let scraper = scraper.clone();
            let pool = pool.clone();
            tokio::spawn(async move {
                match scraper.sync_subscriptions(&pool).await {
                    Ok(count) => info!("Resumed scraping of {} channels", count),
                    Err(e) => error!("Failed to resume channel subscriptions: {:#}", e),
                }
            });
        }

        let subscriptions = SubscriptionService::new(pool.clone(), scraper, rag.clone());
        let bot = Arc::new(BotApp::new(
            components.bot_api,
            subscriptions,
            rag,
            self.config.bot.clone(),
        ));
        if let Err(e) = bot.init().await {
            warn!("Could not identify the bot account: {:#}", e);
        }
        self.bot.tasks = start_bot(bot, response_rx, self.bot.cancel.clone());

        if self.config.server.enabled {
            let state = AppState {
                config: self.config.clone(),
                db: pool,
                vector_store: components.vector_store,
            };
            self.start_http(state).await?;
        }

        info!("TeleRagService started");
        Ok(())
    }

    async fn start_http(&mut self, state: AppState) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .context("Invalid server address configuration")?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        self.local_addr = Some(listener.local_addr()?);
        info!("Starting HTTP server on http://{}", listener.local_addr()?);

        let router = api::create_router(state);
        let cancel = self.http.cancel.clone();
        self.http.tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
            {
                error!("HTTP server error: {}", e);
            }
        }));
        Ok(())
    }

    /// Wait for SIGINT or SIGTERM, then shut down
    pub async fn idle(self) -> Result<()> {
        info!("Waiting for stop signal... Press Ctrl+C to stop.");
        wait_for_signal().await?;
        info!("Stop signal received. Stopping TeleRagService...");
        self.shutdown().await;
        Ok(())
    }

    /// Stop every component in order, returning the stage names as they stopped
    pub async fn shutdown(self) -> Vec<&'static str> {
        let stopped = vec![
            self.bot.stop().await,
            self.scraper.stop().await,
            self.rag.stop().await,
            self.http.stop().await,
        ];
        info!("TeleRagService stopped.");
        stopped
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to install Ctrl+C handler")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")
}
