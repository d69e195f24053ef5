//! BEIR-shaped dataset loading: JSONL corpus and queries, TSV qrels.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{BenchError, Result};

#[derive(Debug, Clone)]
pub struct CorpusDoc {
    pub id: String,
    pub text: String,
    pub title: Option<String>,
}

impl CorpusDoc {
    /// Text submitted to the embedding provider.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => format!("{title}\n{}", self.text),
            _ => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub id: String,
    pub text: String,
}

/// Relevance judgments: query id → corpus id → score ≥ 0.
pub type Qrels = HashMap<String, HashMap<String, i32>>;

#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub split: String,
    pub corpus: Vec<CorpusDoc>,
    pub queries: Vec<Query>,
    pub qrels: Qrels,
}

/// Caps applied at load time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetLimits {
    pub max_corpus: Option<usize>,
    pub max_queries: Option<usize>,
}

#[derive(Deserialize)]
struct CorpusLine {
    #[serde(rename = "_id")]
    id: String,
    text: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct QueryLine {
    #[serde(rename = "_id")]
    id: String,
    text: String,
}

/// Load a dataset directory: `corpus.jsonl`, `queries.jsonl`,
/// `qrels/<split>.tsv`.
///
/// The corpus cap preserves ground truth: every corpus id referenced by a
/// positive qrel is retained, and remaining slots are filled with
/// non-relevant entries in dataset order. Queries are then filtered to those
/// with at least one positive corpus id still present; `max_queries` applies
/// after that filter.
///
/// # Errors
///
/// Returns an error if a file is missing or malformed.
pub fn load(dir: &Path, split: &str, limits: DatasetLimits) -> Result<Dataset> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());

    let corpus = load_corpus(&dir.join("corpus.jsonl"))?;
    let queries = load_queries(&dir.join("queries.jsonl"))?;
    let qrels = load_qrels(&dir.join("qrels").join(format!("{split}.tsv")))?;

    let corpus = cap_corpus(corpus, &qrels, limits.max_corpus);

    let present: HashSet<&str> = corpus.iter().map(|d| d.id.as_str()).collect();
    let mut queries: Vec<Query> = queries
        .into_iter()
        .filter(|q| {
            qrels.get(&q.id).is_some_and(|judged| {
                judged
                    .iter()
                    .any(|(doc, score)| *score > 0 && present.contains(doc.as_str()))
            })
        })
        .collect();
    if let Some(max) = limits.max_queries {
        queries.truncate(max);
    }

    tracing::debug!(
        corpus = corpus.len(),
        queries = queries.len(),
        "dataset {name}/{split} loaded"
    );

    Ok(Dataset {
        name,
        split: split.to_string(),
        corpus,
        queries,
        qrels,
    })
}

fn load_corpus(path: &Path) -> Result<Vec<CorpusDoc>> {
    let data = std::fs::read_to_string(path)?;
    let mut corpus = Vec::new();
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        let parsed: CorpusLine = serde_json::from_str(line)?;
        corpus.push(CorpusDoc {
            id: parsed.id,
            text: parsed.text,
            title: parsed.title,
        });
    }
    Ok(corpus)
}

fn load_queries(path: &Path) -> Result<Vec<Query>> {
    let data = std::fs::read_to_string(path)?;
    let mut queries = Vec::new();
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        let parsed: QueryLine = serde_json::from_str(line)?;
        queries.push(Query {
            id: parsed.id,
            text: parsed.text,
        });
    }
    Ok(queries)
}

fn load_qrels(path: &Path) -> Result<Qrels> {
    let data = std::fs::read_to_string(path)?;
    let mut qrels: Qrels = HashMap::new();
    for (number, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (number == 0 && line.to_lowercase().starts_with("query")) {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(query_id), Some(corpus_id), Some(score)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(BenchError::Format(format!(
                "qrels line {} has fewer than 3 tab-separated fields",
                number + 1
            )));
        };
        let score: i32 = score.trim().parse().map_err(|_| {
            BenchError::Format(format!("qrels line {}: bad score {score:?}", number + 1))
        })?;
        qrels
            .entry(query_id.to_string())
            .or_default()
            .insert(corpus_id.to_string(), score);
    }
    Ok(qrels)
}

/// Apply the corpus cap with ground-truth preservation.
fn cap_corpus(corpus: Vec<CorpusDoc>, qrels: &Qrels, max: Option<usize>) -> Vec<CorpusDoc> {
    let Some(max) = max else {
        return corpus;
    };
    if corpus.len() <= max {
        return corpus;
    }

    let required: HashSet<&str> = qrels
        .values()
        .flat_map(|judged| {
            judged
                .iter()
                .filter(|(_, score)| **score > 0)
                .map(|(doc, _)| doc.as_str())
        })
        .collect();

    let required_present = corpus
        .iter()
        .filter(|d| required.contains(d.id.as_str()))
        .count();
    let mut filler_slots = max.saturating_sub(required_present);

    let mut kept = Vec::new();
    for doc in corpus {
        if required.contains(doc.id.as_str()) {
            kept.push(doc);
        } else if filler_slots > 0 {
            filler_slots -= 1;
            kept.push(doc);
        }
    }
    kept
}
