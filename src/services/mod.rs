//! Business logic services

pub mod channel_feed;
pub mod chroma;
pub mod embedding;
pub mod llm;
pub mod rag;
pub mod scraper;
pub mod subscriptions;
pub mod telegram;
pub mod telerag;
pub mod vector_store;

pub use channel_feed::{ChannelFeed, ChannelPost, FeedError, FeedPage, WebPreviewFeed};
pub use chroma::ChromaStore;
pub use embedding::{build_embedder, Embedder, HashingEmbedder, OpenAiEmbedder};
pub use llm::{ChatModel, LlmClient};
pub use rag::{start_rag, RagClient, RagHandle};
pub use scraper::{start_scraper, ScraperHandle};
pub use subscriptions::{AddOutcome, SubscriptionService};
pub use telegram::{BotApi, TelegramClient, TelegramError};
pub use telerag::TeleRagService;
pub use vector_store::{build_vector_store, LocalVectorStore, VectorRecord, VectorStore};
