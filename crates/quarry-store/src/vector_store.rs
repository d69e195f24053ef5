use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One record: id, vector, and a JSON payload of metadata.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

/// A search hit with its cosine similarity score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Cosine-similarity k-NN store over `(id, vector, payload)` records.
///
/// Implementations must create collections with cosine distance and index the
/// `path` payload field as a keyword at collection-creation time so
/// [`VectorStore::delete_by_field`] on `path` is efficient.
pub trait VectorStore: Send + Sync {
    fn ensure_collection(&self, collection: &str, vector_size: u64) -> BoxFuture<'_, Result<()>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<()>>;

    fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> BoxFuture<'_, Result<()>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>>>;

    /// Delete every record whose payload `field` equals `value`.
    fn delete_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> BoxFuture<'_, Result<()>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64>>;
}
