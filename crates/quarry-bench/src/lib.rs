//! Retrieval-quality evaluation over labeled query/corpus/qrels datasets.
//!
//! Exercises the same embedding and similarity contracts as the index:
//! corpus and queries are embedded with the production provider, ranked by
//! exact brute-force cosine, and scored with MRR / NDCG / Recall at fixed
//! cut-offs. Retrieval quality is judged against exact search, never an ANN
//! approximation.

pub mod dataset;
pub mod error;
pub mod metrics;
pub mod runner;

pub use dataset::{CorpusDoc, Dataset, DatasetLimits, Query};
pub use error::{BenchError, Result};
pub use runner::{BenchRunner, BenchmarkReport};
