//! Benchmark runner: embed, rank exactly, score.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_embed::EmbeddingProvider;
use quarry_embed::batch::pack_batches;

use crate::dataset::{CorpusDoc, Dataset};
use crate::error::Result;
use crate::metrics::{ndcg, recall, reciprocal_rank};

/// Cut-offs reported for every metric.
pub const CUTOFFS: [usize; 4] = [1, 5, 10, 100];

/// Ranked ids kept per query; metrics never look deeper.
const TOP_K: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRow {
    pub k: usize,
    pub mrr: f64,
    pub ndcg: f64,
    pub recall: f64,
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub dataset: String,
    pub split: String,
    pub provider: String,
    pub corpus_size: usize,
    pub queries_evaluated: usize,
    pub rows: Vec<MetricRow>,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}/{} · provider {} · corpus {} · queries {}",
            self.dataset, self.split, self.provider, self.corpus_size, self.queries_evaluated
        )?;
        writeln!(f, "  {:>4} {:>8} {:>8} {:>8}", "k", "mrr", "ndcg", "recall")?;
        for row in &self.rows {
            writeln!(
                f,
                "  {:>4} {:>8.4} {:>8.4} {:>8.4}",
                row.k, row.mrr, row.ndcg, row.recall
            )?;
        }
        Ok(())
    }
}

/// Embeds a dataset through the production provider and scores exact
/// brute-force retrieval. Embedding matrices are cached on disk keyed by
/// `(dataset, split, provider, count)` so repeated runs skip the provider.
pub struct BenchRunner<P> {
    provider: Arc<P>,
    cache_dir: PathBuf,
}

impl<P: EmbeddingProvider> BenchRunner<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, cache_dir: PathBuf) -> Self {
        Self {
            provider,
            cache_dir,
        }
    }

    /// Run the benchmark over a loaded dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or a matrix cannot be persisted.
    pub async fn run(&self, dataset: &Dataset) -> Result<BenchmarkReport> {
        let corpus_texts: Vec<String> = dataset
            .corpus
            .iter()
            .map(CorpusDoc::embedding_text)
            .collect();
        let query_texts: Vec<String> = dataset.queries.iter().map(|q| q.text.clone()).collect();

        let corpus_matrix = self.embed_cached(dataset, "corpus", &corpus_texts).await?;
        let query_matrix = self.embed_cached(dataset, "queries", &query_texts).await?;

        // Vectors are unit-norm, so dot product equals cosine similarity.
        let mut rankings: Vec<Vec<String>> = Vec::with_capacity(query_matrix.len());
        for query_vector in &query_matrix {
            let mut scored: Vec<(f32, usize)> = corpus_matrix
                .iter()
                .enumerate()
                .map(|(i, corpus_vector)| (dot(query_vector, corpus_vector), i))
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(TOP_K);
            rankings.push(
                scored
                    .into_iter()
                    .map(|(_, i)| dataset.corpus[i].id.clone())
                    .collect(),
            );
        }

        let mut rows = Vec::with_capacity(CUTOFFS.len());
        let mut judged = 0usize;
        for k in CUTOFFS {
            let mut mrr_sum = 0.0;
            let mut ndcg_sum = 0.0;
            let mut mrr_n = 0usize;
            let mut recall_sum = 0.0;
            let mut recall_n = 0usize;

            for (query, ranked) in dataset.queries.iter().zip(&rankings) {
                let Some(qrels) = dataset.qrels.get(&query.id) else {
                    continue;
                };
                mrr_n += 1;
                mrr_sum += reciprocal_rank(ranked, qrels, k);
                ndcg_sum += ndcg(ranked, qrels, k);
                if let Some(r) = recall(ranked, qrels, k) {
                    recall_sum += r;
                    recall_n += 1;
                }
            }

            judged = mrr_n;
            rows.push(MetricRow {
                k,
                mrr: average(mrr_sum, mrr_n),
                ndcg: average(ndcg_sum, mrr_n),
                recall: average(recall_sum, recall_n),
            });
        }

        Ok(BenchmarkReport {
            dataset: dataset.name.clone(),
            split: dataset.split.clone(),
            provider: self.provider.name().to_string(),
            corpus_size: dataset.corpus.len(),
            queries_evaluated: judged,
            rows,
        })
    }

    /// Embed `texts`, reusing the on-disk matrix when one matches the
    /// provider, count, and dimension.
    async fn embed_cached(
        &self,
        dataset: &Dataset,
        kind: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let dim = self.provider.dim();
        let path = self.cache_dir.join(format!(
            "{}_{}_{}_{}_{kind}.f32le",
            dataset.name,
            dataset.split,
            self.provider.name(),
            texts.len(),
        ));

        if let Some(matrix) = read_matrix(&path, dim, texts.len()) {
            tracing::debug!("reusing cached {kind} matrix at {}", path.display());
            return Ok(matrix);
        }

        let mut matrix = Vec::with_capacity(texts.len());
        let batches = pack_batches(
            texts,
            self.provider.max_batch_texts(),
            self.provider.max_batch_tokens(),
        );
        for range in batches {
            let vectors = self.provider.embed_batch(&texts[range]).await?;
            matrix.extend(vectors);
        }

        if let Err(e) = write_matrix(&path, &matrix) {
            tracing::warn!("matrix cache write failed: {e}; continuing without cache");
        }
        Ok(matrix)
    }
}

#[allow(clippy::cast_precision_loss)]
fn average(sum: f64, n: usize) -> f64 {
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Raw little-endian f32 matrix, `dim × count`. Rejects size mismatches so a
/// provider or dimension change invalidates stale caches.
fn read_matrix(path: &Path, dim: usize, count: usize) -> Option<Vec<Vec<f32>>> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.len() != dim * count * 4 {
        return None;
    }
    let mut matrix = Vec::with_capacity(count);
    for row in bytes.chunks_exact(dim * 4) {
        let vector: Vec<f32> = row
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        matrix.push(vector);
    }
    Some(matrix)
}

fn write_matrix(path: &Path, matrix: &[Vec<f32>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut bytes = Vec::with_capacity(matrix.iter().map(|v| v.len() * 4).sum());
    for vector in matrix {
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
