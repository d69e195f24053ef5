use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_extensions() -> Vec<String> {
    ["ts", "tsx", "js", "jsx", "mts", "cts", "mjs", "cjs"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root of the indexing domain.
    pub root_dir: PathBuf,
    /// File extensions the scanner admits.
    pub extensions: Vec<String>,
    /// Vector store endpoint.
    pub qdrant_url: String,
    /// Vector store namespace.
    pub collection_name: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// API key for the embedding provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    /// Target token ceiling per chunk.
    pub max_chunk_tokens: usize,
    /// Target token floor per chunk.
    pub min_chunk_tokens: usize,
    /// Embedding cache file, relative to `root_dir`.
    pub cache_path: PathBuf,
    /// Default search cut-off.
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            extensions: default_extensions(),
            qdrant_url: "http://localhost:6334".to_string(),
            collection_name: "quarry_code".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            openai_api_key: None,
            max_chunk_tokens: 512,
            min_chunk_tokens: 30,
            cache_path: PathBuf::from(".cache/embeddings.json"),
            top_k: 10,
        }
    }
}

impl IndexConfig {
    /// Build a config from defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INDEX_DIR") {
            self.root_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QDRANT_URL") {
            self.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("QDRANT_COLLECTION") {
            self.collection_name = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
    }

    /// Path of the persisted Merkle summary.
    #[must_use]
    pub fn merkle_path(&self) -> PathBuf {
        self.root_dir.join(".cache").join("merkle-state.json")
    }

    /// Absolute path of the embedding cache file.
    #[must_use]
    pub fn cache_file(&self) -> PathBuf {
        self.root_dir.join(&self.cache_path)
    }

    /// Embedding dimension implied by the configured model.
    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        if self.embedding_model.contains("3-large") {
            3072
        } else {
            1536
        }
    }
}
