//! Incremental indexing pipeline: scan → hash → diff → chunk → embed → upsert.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use quarry_embed::EmbeddingProvider;
use quarry_embed::batch::pack_batches;
use quarry_store::{VectorPoint, VectorStore};

use crate::cache::{CacheStats, EmbeddingCache};
use crate::chunker::{self, Chunk, ChunkerConfig};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::hasher;
use crate::ids::point_id;
use crate::merkle;
use crate::progress::{ProgressEvent, ProgressTx};
use crate::retriever::{Retriever, SearchResult};
use crate::scanner;

const UPSERT_BATCH: usize = 256;

/// Summary of one index run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_chunks: usize,
    pub new_chunks: usize,
    pub cached_chunks: usize,
    pub elapsed_ms: u64,
}

/// Point-in-time view of the index for status commands.
#[derive(Debug, Clone, Copy)]
pub struct IndexStatus {
    pub points: u64,
    pub cache: CacheStats,
}

/// Orchestrates incremental indexing over one `(root, collection)` pair.
///
/// Owns the Merkle summary and embedding cache for its root; the vector
/// store is shared but assumes a single writer per collection.
pub struct Indexer<P> {
    config: IndexConfig,
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    cache: EmbeddingCache,
    progress: Option<ProgressTx>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<P: EmbeddingProvider> Indexer<P> {
    #[must_use]
    pub fn new(config: IndexConfig, provider: Arc<P>, store: Arc<dyn VectorStore>) -> Self {
        let cache = EmbeddingCache::load(&config.cache_file());
        Self {
            config,
            provider,
            store,
            cache,
            progress: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, tx: ProgressTx) -> Self {
        self.progress = Some(tx);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Cooperative cancellation point between pipeline steps. Entries already
    /// written to the cache are individually valid, so the cache is flushed;
    /// the Merkle summary is not, so the next run redoes the work.
    fn checkpoint(&mut self) -> Result<()> {
        if self.cancelled() {
            if let Err(e) = self.cache.save() {
                tracing::warn!("cache save on cancel failed: {e}");
            }
            return Err(IndexError::Cancelled);
        }
        Ok(())
    }

    /// Ensure the collection exists with the provider's declared dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector store is unreachable.
    pub async fn init(&self) -> Result<()> {
        let dim = u64::try_from(self.provider.dim())?;
        self.store
            .ensure_collection(&self.config.collection_name, dim)
            .await?;
        Ok(())
    }

    /// Run one incremental index pass.
    ///
    /// # Errors
    ///
    /// Returns an error on scan failure, embedding failure, vector-store
    /// failure, or cancellation; per-file read and parse failures are
    /// reported to the progress sink and skipped.
    pub async fn index(&mut self) -> Result<IndexStats> {
        let started = Instant::now();
        self.init().await?;

        self.emit(ProgressEvent::Phase("scan"));
        let files = scanner::scan_directory(&self.config.root_dir, &self.config.extensions)?;
        self.checkpoint()?;

        self.emit(ProgressEvent::Phase("hash"));
        let outcome = hasher::hash_files(&files);
        for (path, error) in &outcome.failed {
            self.emit(ProgressEvent::FileSkipped {
                path: path.display().to_string(),
                reason: error.to_string(),
            });
        }

        let mut rel_to_abs: HashMap<String, PathBuf> = HashMap::new();
        let mut file_hashes: Vec<(String, String)> = Vec::new();
        for fh in &outcome.hashed {
            let Some(rel) = scanner::relative_path(&self.config.root_dir, &fh.path) else {
                continue;
            };
            rel_to_abs.insert(rel.clone(), fh.path.clone());
            file_hashes.push((rel, fh.hash.clone()));
        }
        file_hashes.sort();

        self.emit(ProgressEvent::Phase("diff"));
        let new_summary = merkle::build(&file_hashes);
        let previous = merkle::load(&self.config.merkle_path());
        let had_previous = !previous.is_empty();
        let diff = merkle::diff(&previous, &new_summary);

        if had_previous && diff.is_empty() {
            self.emit(ProgressEvent::NoChanges);
            return Ok(IndexStats {
                total_files: file_hashes.len(),
                elapsed_ms: elapsed_ms(&started),
                ..IndexStats::default()
            });
        }
        self.checkpoint()?;

        // Invalidate by path, not by id: a modified file's chunks map to new
        // content hashes, and a by-path filter-delete removes the superseded
        // records in one pass. Fatal on failure, or stale records would
        // survive for modified files.
        for path in diff.removed.iter().chain(diff.modified.iter()) {
            self.store
                .delete_by_field(&self.config.collection_name, "path", path)
                .await?;
        }

        let selected: Vec<String> = if had_previous {
            diff.added.iter().chain(diff.modified.iter()).cloned().collect()
        } else {
            file_hashes.iter().map(|(path, _)| path.clone()).collect()
        };

        self.emit(ProgressEvent::Phase("chunk"));
        let chunker_config = ChunkerConfig {
            max_tokens: self.config.max_chunk_tokens,
            min_tokens: self.config.min_chunk_tokens,
        };
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut failed_files: HashSet<String> = HashSet::new();
        for rel in &selected {
            let Some(abs) = rel_to_abs.get(rel) else {
                continue;
            };
            let text = match tokio::fs::read_to_string(abs).await {
                Ok(text) => text,
                Err(e) => {
                    self.emit(ProgressEvent::FileSkipped {
                        path: rel.clone(),
                        reason: e.to_string(),
                    });
                    failed_files.insert(rel.clone());
                    continue;
                }
            };
            match chunker::chunk(rel, &text, &chunker_config) {
                Ok(mut file_chunks) => chunks.append(&mut file_chunks),
                Err(e) => {
                    self.emit(ProgressEvent::FileSkipped {
                        path: rel.clone(),
                        reason: e.to_string(),
                    });
                    failed_files.insert(rel.clone());
                }
            }
        }
        self.checkpoint()?;

        let mut cached_count = 0usize;
        let mut new_count = 0usize;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut embed_hashes: Vec<String> = Vec::new();
        let mut embed_texts: Vec<String> = Vec::new();
        for chunk in &chunks {
            if self.cache.has(&chunk.content_hash) {
                cached_count += 1;
            } else {
                new_count += 1;
                if seen.insert(&chunk.content_hash) {
                    embed_hashes.push(chunk.content_hash.clone());
                    embed_texts.push(chunk.text.clone());
                }
            }
        }

        self.emit(ProgressEvent::Phase("embed"));
        let batches = pack_batches(
            &embed_texts,
            self.provider.max_batch_texts(),
            self.provider.max_batch_tokens(),
        );
        let total = embed_texts.len();
        let mut done = 0;
        for range in batches {
            self.checkpoint()?;
            let vectors = self.provider.embed_batch(&embed_texts[range.clone()]).await?;
            for (hash, vector) in embed_hashes[range.clone()].iter().zip(vectors) {
                self.cache.set(hash.clone(), vector);
            }
            done += range.len();
            self.emit(ProgressEvent::Embedded { done, total });
        }

        self.emit(ProgressEvent::Phase("upsert"));
        self.checkpoint()?;
        let mut points = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let Some(vector) = self.cache.get(&chunk.content_hash) else {
                return Err(IndexError::Other(format!(
                    "no vector for chunk {}",
                    chunk.content_hash
                )));
            };
            points.push(VectorPoint {
                id: point_id(&chunk.content_hash),
                vector: vector.to_vec(),
                payload: payload_of(chunk),
            });
        }
        for batch in points.chunks(UPSERT_BATCH) {
            self.store
                .upsert(&self.config.collection_name, batch.to_vec())
                .await?;
        }

        // Summary after a successful upsert; a crash in between is safe, the
        // next run rediffs and redoes the work idempotently. Files that
        // failed mid-run are left out so they count as added next time.
        let summary = if failed_files.is_empty() {
            new_summary
        } else {
            let retained: Vec<(String, String)> = file_hashes
                .iter()
                .filter(|(path, _)| !failed_files.contains(path))
                .cloned()
                .collect();
            merkle::build(&retained)
        };
        merkle::save(&self.config.merkle_path(), &summary)?;

        if let Err(e) = self.cache.save() {
            tracing::warn!("embedding cache save failed: {e}; next run re-embeds");
        }

        Ok(IndexStats {
            total_files: file_hashes.len(),
            total_chunks: chunks.len(),
            new_chunks: new_count,
            cached_chunks: cached_count,
            elapsed_ms: elapsed_ms(&started),
        })
    }

    /// Search the collection and return live source text for each hit.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or the store search fails.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let retriever = Retriever::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            self.config.root_dir.clone(),
            self.config.collection_name.clone(),
        );
        retriever.search(query, k).await
    }

    /// Collection point count plus cache statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the store count fails.
    pub async fn get_stats(&self) -> Result<IndexStatus> {
        let collection = &self.config.collection_name;
        let points = if self.store.collection_exists(collection).await? {
            self.store.count(collection).await?
        } else {
            0
        };
        Ok(IndexStatus {
            points,
            cache: self.cache.stats(),
        })
    }

    /// Drop the collection, the cache, and the Merkle summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete or state file removal fails; a
    /// missing collection or summary file is not an error.
    pub async fn reset(&mut self) -> Result<()> {
        let collection = &self.config.collection_name;
        if self.store.collection_exists(collection).await? {
            self.store.delete_collection(collection).await?;
        }

        self.cache.clear();
        self.cache.save()?;

        match std::fs::remove_file(self.config.merkle_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

fn payload_of(chunk: &Chunk) -> HashMap<String, serde_json::Value> {
    let mut payload = HashMap::from([
        ("path".to_string(), serde_json::json!(chunk.path)),
        ("startLine".to_string(), serde_json::json!(chunk.start_line)),
        ("endLine".to_string(), serde_json::json!(chunk.end_line)),
        ("contentHash".to_string(), serde_json::json!(chunk.content_hash)),
        ("nodeType".to_string(), serde_json::json!(chunk.node_kind)),
    ]);
    if let Some(symbol) = &chunk.symbol {
        payload.insert("symbolName".to_string(), serde_json::json!(symbol));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_embed::MockEmbedder;
    use quarry_store::InMemoryStore;
    use std::fs;
    use std::path::Path;

    fn test_config(root: &Path) -> IndexConfig {
        IndexConfig {
            root_dir: root.to_path_buf(),
            collection_name: "test_chunks".into(),
            ..IndexConfig::default()
        }
    }

    fn test_indexer(root: &Path) -> Indexer<MockEmbedder> {
        let provider = Arc::new(MockEmbedder::new(16));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
        Indexer::new(test_config(root), provider, store)
    }

    #[tokio::test]
    async fn cold_start_indexes_everything() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.ts"),
            "export function beta(): number {\n  return 2;\n}\n",
        )
        .unwrap();

        let mut indexer = test_indexer(dir.path());
        let stats = indexer.index().await.unwrap();

        assert_eq!(stats.total_files, 2);
        assert!(stats.total_chunks >= 2);
        assert_eq!(stats.new_chunks, stats.total_chunks);
        assert_eq!(stats.cached_chunks, 0);
        assert!(stats.elapsed_ms > 0);
        assert!(dir.path().join(".cache/merkle-state.json").exists());
        assert!(dir.path().join(".cache/embeddings.json").exists());

        // Every chunk's cached vector matches the provider dimension.
        let chunker_config = ChunkerConfig {
            max_tokens: indexer.config.max_chunk_tokens,
            min_tokens: indexer.config.min_chunk_tokens,
        };
        for file in ["a.ts", "b.ts"] {
            let text = fs::read_to_string(dir.path().join(file)).unwrap();
            for chunk in chunker::chunk(file, &text, &chunker_config).unwrap() {
                let vector = indexer.cache.get(&chunk.content_hash).unwrap();
                assert_eq!(vector.len(), 16);
            }
        }
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();

        let provider = Arc::new(MockEmbedder::new(16));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
        let mut indexer = Indexer::new(test_config(dir.path()), Arc::clone(&provider), store);

        indexer.index().await.unwrap();
        let calls_after_first = provider.call_count();

        let stats = indexer.index().await.unwrap();
        assert_eq!(stats.new_chunks, 0);
        assert_eq!(stats.total_chunks, 0);
        assert!(stats.elapsed_ms > 0);
        assert_eq!(provider.call_count(), calls_after_first, "no provider calls on no-op");
    }

    #[tokio::test]
    async fn modified_file_reembeds_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.ts"),
            "export function beta(): number {\n  return 2;\n}\n",
        )
        .unwrap();

        let mut indexer = test_indexer(dir.path());
        indexer.index().await.unwrap();

        fs::write(
            dir.path().join("b.ts"),
            "export function beta(): number {\n  return 3;\n}\n",
        )
        .unwrap();
        let stats = indexer.index().await.unwrap();

        assert_eq!(stats.total_files, 2);
        assert!(stats.new_chunks >= 1);
        // Old and new hashes both live in the cache.
        assert!(indexer.cache.len() >= stats.new_chunks + 1);
    }

    #[tokio::test]
    async fn removed_file_points_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.ts"),
            "export function beta(): number {\n  return 2;\n}\n",
        )
        .unwrap();

        let mut indexer = test_indexer(dir.path());
        indexer.index().await.unwrap();
        let before = indexer.get_stats().await.unwrap().points;

        fs::remove_file(dir.path().join("b.ts")).unwrap();
        indexer.index().await.unwrap();
        let after = indexer.get_stats().await.unwrap().points;

        assert!(after < before);
        // The cache keeps the removed file's hashes for later pruning.
        assert!(indexer.cache.len() as u64 > after);
    }

    #[tokio::test]
    async fn embed_failure_leaves_summary_unwritten() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();

        let provider = Arc::new(MockEmbedder::failing(16));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
        let mut indexer = Indexer::new(test_config(dir.path()), provider, store);

        assert!(indexer.index().await.is_err());
        assert!(!dir.path().join(".cache/merkle-state.json").exists());
    }

    #[tokio::test]
    async fn unparseable_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("good.ts"),
            "export function good(): number {\n  return 1;\n}\n",
        )
        .unwrap();
        // Invalid UTF-8 fails the read and must not abort the run.
        fs::write(dir.path().join("bad.ts"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let provider = Arc::new(MockEmbedder::new(16));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
        let mut indexer =
            Indexer::new(test_config(dir.path()), provider, store).with_progress(tx);

        let stats = indexer.index().await.unwrap();
        assert!(stats.total_chunks >= 1);

        let mut skipped = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::FileSkipped { path, .. } = event {
                skipped.push(path);
            }
        }
        assert!(skipped.iter().any(|p| p.contains("bad.ts")));

        // The skipped file is absent from the summary, so the next run
        // retries it instead of treating it as indexed.
        let summary = merkle::load(&indexer.config.merkle_path());
        assert!(summary.iter().all(|n| !n.path.contains("bad.ts")));
    }

    #[tokio::test]
    async fn cancel_before_run_aborts_without_summary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();

        let (cancel_tx, cancel_rx) = watch::channel(true);
        let _keep = cancel_tx;
        let mut indexer = test_indexer(dir.path()).with_cancel(cancel_rx);

        let result = indexer.index().await;
        assert!(matches!(result, Err(IndexError::Cancelled)));
        assert!(!dir.path().join(".cache/merkle-state.json").exists());
    }

    #[tokio::test]
    async fn reset_clears_collection_cache_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "export function alpha(): number {\n  return 1;\n}\n",
        )
        .unwrap();

        let mut indexer = test_indexer(dir.path());
        indexer.index().await.unwrap();
        indexer.reset().await.unwrap();

        let status = indexer.get_stats().await.unwrap();
        assert_eq!(status.points, 0);
        assert_eq!(status.cache.entries, 0);
        assert!(!dir.path().join(".cache/merkle-state.json").exists());
    }

    #[tokio::test]
    async fn reset_on_fresh_state_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut indexer = test_indexer(dir.path());
        indexer.reset().await.unwrap();
    }

    #[test]
    fn payload_includes_symbol_only_when_present() {
        let chunk = Chunk {
            id: "h".into(),
            path: "src/a.ts".into(),
            start_line: 1,
            end_line: 3,
            text: "function f() {}".into(),
            node_kind: "function_declaration".into(),
            symbol: None,
            content_hash: "h".into(),
        };
        let payload = payload_of(&chunk);
        assert!(!payload.contains_key("symbolName"));
        assert_eq!(payload.get("path").unwrap(), "src/a.ts");
        assert_eq!(payload.get("startLine").unwrap(), 1);
        assert_eq!(payload.get("nodeType").unwrap(), "function_declaration");
    }
}
