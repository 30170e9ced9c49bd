//! TeleRAG Library
//!
//! Telegram bot that answers questions from the posts of the public channels
//! each user registers as sources.

use std::sync::Arc;

pub mod api;
pub mod bot;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
use services::VectorStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Vector store holding the channel collections
    pub vector_store: Arc<dyn VectorStore>,
}
