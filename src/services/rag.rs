//! Retrieval-augmented generation
//!
//! The ingestion loop chunks, embeds and stores every scraped post in its
//! channel's collection. The query loop answers user questions from the
//! nearest chunks of the user's channels.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::models::{RagRequest, RagResponse, ScrapedMessage};
use crate::services::embedding::Embedder;
use crate::services::llm::{build_user_prompt, ChannelContext, ChatModel, SYSTEM_PROMPT};
use crate::services::vector_store::{VectorRecord, VectorStore};
use crate::utils::text::{chunk_id, chunk_text};

/// Answer sent when none of the user's channels has matching documents
pub const NO_INFORMATION_ANSWER: &str =
    "К сожалению, в ваших источниках пока нет информации, чтобы ответить на этот вопрос.";

/// Answer sent when the language model call fails
pub const GENERATION_FAILED_ANSWER: &str =
    "Извините, не удалось сгенерировать ответ. Попробуйте повторить запрос позже.";

/// Collection name of a channel
pub fn collection_name(channel_id: i64) -> String {
    channel_id.to_string()
}

/// Ingestion and answering logic, independent of the queues
pub struct RagClient {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    config: RagConfig,
}

impl RagClient {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Chunk, embed and store one post. Returns the number of chunks stored.
    pub async fn ingest(&self, message: &ScrapedMessage) -> Result<usize> {
        let chunks = chunk_text(&message.text, self.config.max_chunk_size);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self
            .embedder
            .embed(&chunks)
            .await
            .context("Failed to embed message chunks")?;

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord {
                id: chunk_id(&chunk),
                document: chunk,
                embedding,
                channel_name: message.channel_name.clone(),
            })
            .collect();
        let count = records.len();

        let collection = collection_name(message.channel_id);
        self.store.get_or_create_collection(&collection).await?;
        self.store.add(&collection, records).await?;

        info!(
            "Added new message to collection {} ({})",
            message.channel_id, message.channel_name
        );
        Ok(count)
    }

    /// Nearest documents of each channel that has a collection
    pub async fn retrieve(&self, request: &str, channel_ids: &[i64]) -> Result<Vec<ChannelContext>> {
        let query = vec![request.to_string()];
        let embedding = self
            .embedder
            .embed(&query)
            .await
            .context("Failed to embed request")?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedder returned no vector for the request"))?;

        let mut contexts = Vec::new();
        for &channel_id in channel_ids {
            let collection = collection_name(channel_id);
            match self.channel_context(&collection, &embedding).await {
                Ok(Some(context)) => contexts.push(context),
                Ok(None) => debug!("No documents in collection {}", collection),
                Err(e) => warn!("Failed to query collection {}: {:#}", collection, e),
            }
        }
        Ok(contexts)
    }

    async fn channel_context(
        &self,
        collection: &str,
        embedding: &[f32],
    ) -> Result<Option<ChannelContext>> {
        if !self.store.collection_exists(collection).await? {
            return Ok(None);
        }

        let matches = self
            .store
            .query(collection, embedding, self.config.n_result)
            .await?;
        if matches.is_empty() {
            return Ok(None);
        }

        let channel_name = match matches.first().map(|m| m.channel_name.clone()) {
            Some(name) if !name.is_empty() => name,
            _ => self
                .store
                .channel_name(collection)
                .await?
                .unwrap_or_else(|| "Unknown".to_string()),
        };

        Ok(Some(ChannelContext {
            channel_name,
            documents: matches.into_iter().map(|m| m.document).collect(),
        }))
    }

    /// Produce the answer for a request. Never fails: errors become fixed answers.
    pub async fn answer(&self, request: &RagRequest) -> RagResponse {
        let started = Instant::now();
        info!(
            "Started processing RAG request for {} with request: {}",
            request.user_id, request.request
        );

        let text = match self.retrieve(&request.request, &request.channel_ids).await {
            Ok(contexts) if contexts.is_empty() => NO_INFORMATION_ANSWER.to_string(),
            Ok(contexts) => {
                let prompt = build_user_prompt(&request.request, &contexts);
                match self.llm.complete(SYSTEM_PROMPT, &prompt).await {
                    Ok(text) => text,
                    Err(e) => {
                        error!("LLM request failed for {}: {:#}", request.user_id, e);
                        GENERATION_FAILED_ANSWER.to_string()
                    }
                }
            }
            Err(e) => {
                error!("Retrieval failed for {}: {:#}", request.user_id, e);
                GENERATION_FAILED_ANSWER.to_string()
            }
        };

        info!(
            "Generated response for {} in {:.2} seconds",
            request.user_id,
            started.elapsed().as_secs_f64()
        );

        RagResponse {
            request_id: request.id,
            user_id: request.user_id,
            text,
        }
    }

    /// Drop a channel's collection
    pub async fn delete_channel(&self, channel_id: i64) -> Result<()> {
        let collection = collection_name(channel_id);
        if self.store.delete_collection(&collection).await? {
            info!("Deleted collection {} from RAG database", channel_id);
        } else {
            warn!("Collection {} not found in RAG database", channel_id);
        }
        Ok(())
    }
}

/// Entry point for other components to reach the running RAG loops
#[derive(Clone)]
pub struct RagHandle {
    client: Arc<RagClient>,
    requests: mpsc::Sender<RagRequest>,
    cancel: CancellationToken,
}

impl RagHandle {
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Queue a question. Ignored once the RAG loops are stopped.
    pub async fn query(&self, user_id: i64, request: &str, channel_ids: Vec<i64>) -> Result<()> {
        if !self.is_running() {
            debug!("RAG is stopped, ignoring request from {}", user_id);
            return Ok(());
        }
        self.requests
            .send(RagRequest::new(user_id, request, channel_ids))
            .await
            .map_err(|_| anyhow!("RAG request queue is closed"))
    }

    pub async fn delete_channel(&self, channel_id: i64) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.client.delete_channel(channel_id).await
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        self.client.store()
    }
}

/// Spawn the ingestion and query loops
pub fn start_rag(
    client: Arc<RagClient>,
    messages: mpsc::Receiver<ScrapedMessage>,
    responses: mpsc::Sender<RagResponse>,
    cancel: CancellationToken,
) -> (RagHandle, Vec<JoinHandle<()>>) {
    let (requests, request_rx) = mpsc::channel(client.config.queue_capacity.max(1));

    let ingest_task = tokio::spawn(ingestion_loop(client.clone(), messages, cancel.clone()));
    let query_task = tokio::spawn(query_loop(
        client.clone(),
        request_rx,
        responses,
        cancel.clone(),
    ));

    info!("RAG client started");
    (
        RagHandle {
            client,
            requests,
            cancel,
        },
        vec![ingest_task, query_task],
    )
}

async fn ingestion_loop(
    client: Arc<RagClient>,
    mut messages: mpsc::Receiver<ScrapedMessage>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = messages.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if let Err(e) = client.ingest(&message).await {
            error!(
                "Failed to index message from channel {}: {:#}",
                message.channel_id, e
            );
        }
    }
    info!("RAG ingestion loop stopped");
}

async fn query_loop(
    client: Arc<RagClient>,
    requests: mpsc::Receiver<RagRequest>,
    responses: mpsc::Sender<RagResponse>,
    cancel: CancellationToken,
) {
    let concurrency = client.config.query_concurrency.max(1);
    let incoming = futures::stream::unfold(requests, |mut rx| async move {
        rx.recv().await.map(|request| (request, rx))
    });

    incoming
        .take_until(cancel.cancelled())
        .for_each_concurrent(concurrency, |request| {
            let client = client.clone();
            let responses = responses.clone();
            async move {
                let response = client.answer(&request).await;
                if responses.send(response).await.is_err() {
                    warn!("Response queue closed, dropping answer for {}", request.user_id);
                }
            }
        })
        .await;

    info!("RAG query loop stopped");
}
