//! Test-only deterministic embedding provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, l2_normalize};

/// Deterministic bag-of-words embedder.
///
/// Each word is folded to a lowercase 3-char stem and hashed into one of
/// `dim` buckets, so morphologically related words ("add", "addition") land
/// in the same bucket and score close under cosine similarity. Same text
/// always produces the same vector.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dim: usize,
    calls: Arc<AtomicUsize>,
    pub fail: bool,
    pub batch_limit: usize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
            batch_limit: 32,
        }
    }

    #[must_use]
    pub fn failing(dim: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dim)
        }
    }

    /// Number of backend calls made so far (single + batch).
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let stem: String = word.to_lowercase().chars().take(3).collect();
            let bucket = fnv1a(stem.as_bytes()) as usize % self.dim;
            vector[bucket] += 1.0;
        }
        if vector.iter().all(|x| *x == 0.0) {
            vector[0] = 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbedError::Other("mock embed error".into()));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbedError::Other("mock embed error".into()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_batch_texts(&self) -> usize {
        self.batch_limit
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
