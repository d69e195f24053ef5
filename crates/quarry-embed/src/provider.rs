use crate::error::Result;

/// Contract for embedding backends.
///
/// Implementations map text to L2-unit-norm vectors of a fixed, declared
/// dimension. Batch embedding preserves input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails or the response is invalid.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embed a batch of texts, one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails or the response is invalid.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Dimension of every vector this provider produces.
    fn dim(&self) -> usize;

    /// Maximum number of texts per backend call.
    fn max_batch_texts(&self) -> usize {
        64
    }

    /// Optional token budget per backend call. `None` means unbounded.
    fn max_batch_tokens(&self) -> Option<usize> {
        None
    }

    /// Provider name for logging and cache keys.
    fn name(&self) -> &'static str;
}

/// Scale a vector to unit L2 norm in place. A zero vector is left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
