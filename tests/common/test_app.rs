//! Test application setup utilities
//!
//! Provides utilities for setting up test instances of the application with
//! temporary databases, in-memory vector stores and mock services.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use telerag::{
    api,
    bot::BotApp,
    config::AppConfig,
    db::{self, DbPool},
    models::{RagResponse, TgUser},
    services::{
        embedding::HashingEmbedder,
        rag::{collection_name, start_rag, RagClient, RagHandle},
        scraper::{start_scraper, ScraperHandle},
        subscriptions::SubscriptionService,
        vector_store::{LocalVectorStore, VectorStore},
    },
    AppState,
};

use super::fixtures::{test_config, UpdateFixtures};
use super::mocks::{MockBotApi, MockChatModel, MockFeed};

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application with a temporary SQLite database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let state = AppState {
            config,
            db,
            vector_store: Arc::new(LocalVectorStore::in_memory()),
        };

        let router = api::create_router(state.clone());

        Self { router, state }
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// The bot wired to a real database, scraper and RAG loops, with mocked
/// Telegram, channel feed and chat model
pub struct TestBot {
    pub app: Arc<BotApp>,
    pub api: Arc<MockBotApi>,
    pub feed: Arc<MockFeed>,
    pub model: Arc<MockChatModel>,
    pub store: Arc<LocalVectorStore>,
    pub pool: DbPool,
    pub scraper: ScraperHandle,
    pub rag: RagHandle,
    pub config: AppConfig,
    pub cancel: CancellationToken,
    responses: Mutex<mpsc::Receiver<RagResponse>>,
    next_update: AtomicI64,
}

impl TestBot {
    pub async fn new() -> Self {
        Self::with_model(MockChatModel::new("Ответ модели")).await
    }

    pub async fn with_model(model: MockChatModel) -> Self {
        let config = test_config();
        let pool = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let api = Arc::new(MockBotApi::new());
        let feed = Arc::new(MockFeed::default());
        let model = Arc::new(model);
        let store = Arc::new(LocalVectorStore::in_memory());
        let cancel = CancellationToken::new();

        let (message_tx, message_rx) = mpsc::channel(256);
        let (response_tx, response_rx) = mpsc::channel(16);

        let client = Arc::new(RagClient::new(
            store.clone(),
            Arc::new(HashingEmbedder::new(config.embedding.dims)),
            model.clone(),
            config.rag.clone(),
        ));
        let (rag, _) = start_rag(client, message_rx, response_tx, cancel.clone());
        let (scraper, _) = start_scraper(
            feed.clone(),
            config.scraper.clone(),
            message_tx,
            cancel.clone(),
        );

        let subscriptions = SubscriptionService::new(pool.clone(), scraper.clone(), rag.clone());
        let app = Arc::new(BotApp::new(
            api.clone(),
            subscriptions,
            rag.clone(),
            config.bot.clone(),
        ));
        app.init().await.expect("Failed to identify the mock bot");

        Self {
            app,
            api,
            feed,
            model,
            store,
            pool,
            scraper,
            rag,
            config,
            cancel,
            responses: Mutex::new(response_rx),
            next_update: AtomicI64::new(1),
        }
    }

    fn update_id(&self) -> i64 {
        self.next_update.fetch_add(1, Ordering::SeqCst)
    }

    /// Deliver a private text message from `from`
    pub async fn send(&self, from: &TgUser, text: &str) {
        let update = UpdateFixtures::text(self.update_id(), from, text);
        self.app.handle_update(update).await;
    }

    /// Press an inline button with `data` on bot message `message_id`
    pub async fn press(&self, from: &TgUser, message_id: i64, data: &str) {
        let update = UpdateFixtures::callback(self.update_id(), from, message_id, data);
        self.app.handle_update(update).await;
    }

    /// Run the whole add-source conversation
    pub async fn add_source(&self, from: &TgUser, link: &str) {
        self.send(from, "/add").await;
        self.send(from, link).await;
    }

    /// Next answer produced by the RAG query loop
    pub async fn next_response(&self) -> RagResponse {
        let mut responses = self.responses.lock().await;
        tokio::time::timeout(Duration::from_secs(5), responses.recv())
            .await
            .expect("Timed out waiting for a RAG response")
            .expect("Response queue closed")
    }

    /// Wait until a channel's collection holds at least `count` chunks
    pub async fn wait_for_chunks(&self, channel_id: i64, count: usize) {
        let query = HashingEmbedder::new(self.config.embedding.dims).embed_one("query");
        let collection = collection_name(channel_id);
        let wait = async {
            loop {
                let stored = self
                    .store
                    .query(&collection, &query, 1000)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                if stored >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("Timed out waiting for ingestion");
    }
}

impl Drop for TestBot {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
