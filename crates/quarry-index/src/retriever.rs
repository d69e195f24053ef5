//! Semantic retrieval: query embedding, k-NN search, live source re-read.
//!
//! The vector store holds only metadata, never code. Each hit's text is
//! sliced out of the file on disk at display time, so results always show
//! the current source even when the index is slightly stale.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_embed::EmbeddingProvider;
use quarry_store::{ScoredPoint, VectorStore};

use crate::error::Result;

/// A ranked search hit with live file content.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
    pub node_kind: String,
    pub symbol: Option<String>,
    pub content_hash: String,
    pub content: String,
}

pub struct Retriever<P> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    root: PathBuf,
    collection: String,
}

impl<P: EmbeddingProvider> Retriever<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        root: PathBuf,
        collection: String,
    ) -> Self {
        Self {
            provider,
            store,
            root,
            collection,
        }
    }

    /// Embed the query and return the top-k hits with current on-disk text.
    /// A missing collection yields zero results rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error if query embedding or the store search fails.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(query).await?;
        let limit = u64::try_from(k)?;
        let hits = self.store.search(&self.collection, vector, limit).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(result) = self.resolve(hit).await {
                results.push(result);
            }
        }
        Ok(results)
    }

    async fn resolve(&self, hit: ScoredPoint) -> Option<SearchResult> {
        let payload = hit.payload;
        let path = payload.get("path")?.as_str()?.to_string();
        let start_line = usize::try_from(payload.get("startLine")?.as_u64()?).ok()?;
        let end_line = usize::try_from(payload.get("endLine")?.as_u64()?).ok()?;
        let node_kind = payload.get("nodeType")?.as_str()?.to_string();
        let content_hash = payload.get("contentHash")?.as_str()?.to_string();
        let symbol = payload
            .get("symbolName")
            .and_then(|v| v.as_str())
            .map(String::from);

        let content = read_lines(&self.root.join(&path), start_line, end_line)
            .await
            .unwrap_or_else(|| format!("[file not found: {path}]"));

        Some(SearchResult {
            path,
            start_line,
            end_line,
            score: hit.score,
            node_kind,
            symbol,
            content_hash,
            content,
        })
    }
}

/// Slice 1-based inclusive lines out of a file, clamped to its length.
async fn read_lines(path: &Path, start: usize, end: usize) -> Option<String> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Some(String::new());
    }
    let start = start.clamp(1, lines.len());
    let end = end.clamp(start, lines.len());
    Some(lines[start - 1..=end - 1].join("\n"))
}
