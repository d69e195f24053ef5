//! Incremental semantic code indexing.
//!
//! The pipeline keeps a vector index of a source tree fresh at delta cost:
//! files are hashed and summarized into a Merkle tree, successive summaries
//! are diffed to find changed files, only those are re-chunked, and a
//! content-addressed cache makes embedding an idempotent function of chunk
//! text. Retrieval re-reads live source off disk; the vector store only ever
//! holds metadata.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod error;
pub mod hasher;
pub mod ids;
pub mod indexer;
pub mod merkle;
pub mod progress;
pub mod retriever;
pub mod scanner;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use indexer::{IndexStats, Indexer};
pub use progress::{ProgressEvent, ProgressTx};
pub use retriever::{Retriever, SearchResult};
