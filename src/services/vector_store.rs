//! Vector storage
//!
//! Every channel has its own collection, named after the channel id. Records
//! are keyed by chunk id so re-adding the same chunk replaces it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{VectorBackend, VectorStoreConfig};
use crate::services::chroma::ChromaStore;

/// A document chunk with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub channel_name: String,
}

/// A record returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub channel_name: String,
    /// Cosine distance to the query, lower is closer
    pub distance: f32,
}

/// Per-channel collections of embedded chunks
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn get_or_create_collection(&self, name: &str) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Insert records, replacing any with the same id
    async fn add(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Up to `n` records closest to `embedding`, closest first
    async fn query(&self, collection: &str, embedding: &[f32], n: usize) -> Result<Vec<QueryMatch>>;

    /// Channel name stored with the collection's records
    async fn channel_name(&self, collection: &str) -> Result<Option<String>>;

    /// Returns false when the collection did not exist
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn heartbeat(&self) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// Open the vector store selected in the configuration
pub async fn build_vector_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        VectorBackend::Local => {
            let store = match &config.data_dir {
                Some(dir) => LocalVectorStore::open(dir).await?,
                None => LocalVectorStore::in_memory(),
            };
            Ok(Arc::new(store))
        }
        VectorBackend::Chroma => Ok(Arc::new(ChromaStore::new(config)?)),
    }
}

/// Cosine distance between two vectors; 1.0 when either is all zeros
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    records: Vec<VectorRecord>,
}

/// In-process vector store with brute-force cosine search.
///
/// With a data directory each collection is persisted as `<name>.json`.
pub struct LocalVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    data_dir: Option<PathBuf>,
}

impl LocalVectorStore {
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            data_dir: None,
        }
    }

    /// Open a persistent store, loading every collection found in `dir`
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create vector store directory {}", dir.display()))?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read vector store directory {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Collection>(&content) {
                Ok(collection) => {
                    collections.insert(name, collection);
                }
                Err(e) => warn!("Skipping unreadable collection file {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded {} vector collections from {}",
            collections.len(),
            dir.display()
        );

        Ok(Self {
            collections: RwLock::new(collections),
            data_dir: Some(dir.to_path_buf()),
        })
    }

    fn collection_path(&self, name: &str) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", name)))
    }

    async fn persist(&self, name: &str, collection: &Collection) -> Result<()> {
        let Some(path) = self.collection_path(name) else {
            return Ok(());
        };
        let content = serde_json::to_vec(collection)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write collection {}", path.display()))
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if !collections.contains_key(name) {
            let collection = Collection::default();
            self.persist(name, &collection).await?;
            collections.insert(name.to_string(), collection);
            debug!("Created collection {}", name);
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn add(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();

        for record in records {
            match entry.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => entry.records.push(record),
            }
        }

        self.persist(collection, entry).await
    }

    async fn query(&self, collection: &str, embedding: &[f32], n: usize) -> Result<Vec<QueryMatch>> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = entry
            .records
            .iter()
            .map(|record| QueryMatch {
                id: record.id.clone(),
                document: record.document.clone(),
                channel_name: record.channel_name.clone(),
                distance: cosine_distance(embedding, &record.embedding),
            })
            .collect();

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(n);
        Ok(matches)
    }

    async fn channel_name(&self, collection: &str) -> Result<Option<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.records.first())
            .map(|r| r.channel_name.clone()))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let removed = self.collections.write().await.remove(name).is_some();
        if let Some(path) = self.collection_path(name) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(removed)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
