use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::watch;

use quarry_bench::{BenchRunner, DatasetLimits, dataset};
use quarry_embed::OpenAiEmbedder;
use quarry_index::{IndexConfig, Indexer, ProgressEvent};
use quarry_store::{QdrantStore, VectorStore};

const USAGE: &str = "\
usage: quarry <command>

commands:
  index              incrementally index the configured root
  search <query...>  semantic search over the index
  stats              collection and cache statistics
  reset              drop the collection, cache, and merkle state
  bench <dir> [split]  run the retrieval benchmark on a dataset directory

environment:
  INDEX_DIR, QDRANT_URL, QDRANT_COLLECTION, EMBEDDING_MODEL, OPENAI_API_KEY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = IndexConfig::from_env();

    match command.as_str() {
        "index" => run_index(config).await,
        "search" => {
            let query: Vec<String> = args.collect();
            if query.is_empty() {
                bail!("search requires a query");
            }
            run_search(config, &query.join(" ")).await
        }
        "stats" => run_stats(config).await,
        "reset" => run_reset(config).await,
        "bench" => {
            let dir = args.next().context("bench requires a dataset directory")?;
            let split = args.next().unwrap_or_else(|| "test".to_string());
            run_bench(config, &PathBuf::from(dir), &split).await
        }
        _ => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

fn create_provider(config: &IndexConfig) -> anyhow::Result<Arc<OpenAiEmbedder>> {
    let api_key = config
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY env var required")?;
    Ok(Arc::new(OpenAiEmbedder::new(
        api_key,
        "https://api.openai.com/v1".to_string(),
        config.embedding_model.clone(),
        config.embedding_dim(),
    )))
}

fn create_store(config: &IndexConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store = QdrantStore::new(&config.qdrant_url)
        .with_context(|| format!("failed to connect to qdrant at {}", config.qdrant_url))?;
    Ok(Arc::new(store))
}

fn spawn_progress_printer() -> quarry_index::ProgressTx {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Phase(name) => tracing::info!("{name}"),
                ProgressEvent::FileSkipped { path, reason } => {
                    tracing::warn!("skipped {path}: {reason}");
                }
                ProgressEvent::NoChanges => tracing::info!("no changes since last run"),
                ProgressEvent::Embedded { done, total } => {
                    tracing::info!("embedded {done}/{total}");
                }
            }
        }
    });
    tx
}

async fn run_index(config: IndexConfig) -> anyhow::Result<()> {
    let provider = create_provider(&config)?;
    let store = create_store(&config)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancelling after current step");
            let _ = cancel_tx.send(true);
        }
    });

    let mut indexer = Indexer::new(config, provider, store)
        .with_progress(spawn_progress_printer())
        .with_cancel(cancel_rx);

    let stats = indexer.index().await?;
    println!(
        "{} files · {} chunks ({} embedded, {} cached) in {}ms",
        stats.total_files,
        stats.total_chunks,
        stats.new_chunks,
        stats.cached_chunks,
        stats.elapsed_ms
    );
    Ok(())
}

async fn run_search(config: IndexConfig, query: &str) -> anyhow::Result<()> {
    let top_k = config.top_k;
    let provider = create_provider(&config)?;
    let store = create_store(&config)?;
    let indexer = Indexer::new(config, provider, store);

    let results = indexer.search(query, top_k).await?;
    if results.is_empty() {
        println!("no results");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let symbol = result.symbol.as_deref().unwrap_or(&result.node_kind);
        println!(
            "{}. {} {}:{}-{} ({:.3})",
            rank + 1,
            symbol,
            result.path,
            result.start_line,
            result.end_line,
            result.score
        );
        for line in result.content.lines() {
            println!("   {line}");
        }
        println!();
    }
    Ok(())
}

async fn run_stats(config: IndexConfig) -> anyhow::Result<()> {
    let provider = create_provider(&config)?;
    let store = create_store(&config)?;
    let indexer = Indexer::new(config, provider, store);

    let status = indexer.get_stats().await?;
    println!(
        "points: {} · cache entries: {} · cache size: {} bytes",
        status.points, status.cache.entries, status.cache.disk_bytes
    );
    Ok(())
}

async fn run_reset(config: IndexConfig) -> anyhow::Result<()> {
    let provider = create_provider(&config)?;
    let store = create_store(&config)?;
    let mut indexer = Indexer::new(config, provider, store);

    indexer.reset().await?;
    println!("index reset");
    Ok(())
}

async fn run_bench(config: IndexConfig, dir: &Path, split: &str) -> anyhow::Result<()> {
    let provider = create_provider(&config)?;

    let limits = DatasetLimits {
        max_corpus: env_limit("BENCH_MAX_CORPUS"),
        max_queries: env_limit("BENCH_MAX_QUERIES"),
    };
    let dataset = dataset::load(dir, split, limits)
        .with_context(|| format!("failed to load dataset at {}", dir.display()))?;

    let cache_dir = dir.join(".embeddings");
    let runner = BenchRunner::new(provider, cache_dir);
    let report = runner.run(&dataset).await?;
    print!("{report}");
    Ok(())
}

fn env_limit(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
