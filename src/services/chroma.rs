//! Chroma HTTP client (API v1)

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::VectorStoreConfig;
use crate::services::vector_store::{QueryMatch, VectorRecord, VectorStore};

#[derive(Debug, Deserialize)]
struct ChromaCollection {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChromaQueryResult {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChromaGetResult {
    #[serde(default)]
    metadatas: Option<Vec<Option<Value>>>,
}

/// Vector store backed by a remote Chroma server
#[derive(Clone)]
pub struct ChromaStore {
    client: Client,
    base_url: String,
}

impl ChromaStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let base_url = config
            .chroma_url()
            .context("vector_store.host is required for the chroma backend")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build Chroma HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("{}/api/v1", base_url),
        })
    }

    /// Client for a Chroma server at `base_url` (without the `/api/v1` suffix)
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to build Chroma HTTP client")?,
            base_url: format!("{}/api/v1", base_url.trim_end_matches('/')),
        })
    }

    async fn find_collection(&self, name: &str) -> Result<Option<ChromaCollection>> {
        let response = self
            .client
            .get(format!("{}/collections/{}", self.base_url, name))
            .send()
            .await
            .context("Failed to reach Chroma")?;

        // Chroma reports a missing collection as 400, 404 or 500 depending on version
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST | StatusCode::INTERNAL_SERVER_ERROR
        ) {
            return Ok(None);
        }
        Ok(Some(decode(response).await?))
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/collections", self.base_url))
            .json(&json!({ "name": name, "get_or_create": true }))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        let collection: ChromaCollection = decode(response).await?;
        Ok(collection.id)
    }

    async fn post<T: DeserializeOwned>(&self, path: String, body: Value) -> Result<T> {
        debug!("Chroma: POST {}", path);
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Chroma")?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Chroma request failed with status {}: {}", status, body);
    }
    response
        .json()
        .await
        .context("Failed to parse Chroma response")
}

fn metadata_channel_name(metadata: Option<&Value>) -> String {
    metadata
        .and_then(|m| m.get("channel_name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<()> {
        self.collection_id(name).await.map(|_| ())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.find_collection(name).await?.is_some())
    }

    async fn add(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection).await?;

        let mut ids = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        let mut metadatas = Vec::with_capacity(records.len());
        for record in records {
            ids.push(record.id);
            documents.push(record.document);
            embeddings.push(record.embedding);
            metadatas.push(json!({ "channel_name": record.channel_name }));
        }

        let _: Value = self
            .post(
                format!("/collections/{}/upsert", id),
                json!({
                    "ids": ids,
                    "documents": documents,
                    "embeddings": embeddings,
                    "metadatas": metadatas,
                }),
            )
            .await?;
        Ok(())
    }

    async fn query(&self, collection: &str, embedding: &[f32], n: usize) -> Result<Vec<QueryMatch>> {
        let Some(found) = self.find_collection(collection).await? else {
            return Ok(Vec::new());
        };

        let result: ChromaQueryResult = self
            .post(
                format!("/collections/{}/query", found.id),
                json!({
                    "query_embeddings": [embedding],
                    "n_results": n,
                    "include": ["documents", "metadatas", "distances"],
                }),
            )
            .await?;

        let ids = result.ids.into_iter().next().unwrap_or_default();
        let documents = result.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let metadatas = result.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let distances = result.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| QueryMatch {
                id,
                document: documents.get(i).cloned().flatten().unwrap_or_default(),
                channel_name: metadata_channel_name(metadatas.get(i).and_then(Option::as_ref)),
                distance: distances.get(i).copied().unwrap_or(1.0),
            })
            .collect())
    }

    async fn channel_name(&self, collection: &str) -> Result<Option<String>> {
        let Some(found) = self.find_collection(collection).await? else {
            return Ok(None);
        };
        let result: ChromaGetResult = self
            .post(
                format!("/collections/{}/get", found.id),
                json!({ "limit": 1, "include": ["metadatas"] }),
            )
            .await?;

        Ok(result
            .metadatas
            .unwrap_or_default()
            .first()
            .map(|m| metadata_channel_name(m.as_ref())))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if self.find_collection(name).await?.is_none() {
            return Ok(false);
        }
        let response = self
            .client
            .delete(format!("{}/collections/{}", self.base_url, name))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        let _: Value = decode(response).await.unwrap_or(Value::Null);
        Ok(true)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        let collections: Vec<ChromaCollection> = decode(response).await?;
        Ok(collections.into_iter().map(|c| c.name).collect())
    }

    async fn heartbeat(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/heartbeat", self.base_url))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        let _: Value = decode(response).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "chroma"
    }
}
