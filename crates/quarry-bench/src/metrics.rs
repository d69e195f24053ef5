//! Standard IR metrics over a ranked id list and per-query qrels.

use std::collections::HashMap;
use std::collections::HashSet;

/// `1 / rank` of the first positive-relevance id within the top-k, 0 if none.
#[must_use]
pub fn reciprocal_rank(ranked: &[String], qrels: &HashMap<String, i32>, k: usize) -> f64 {
    for (i, id) in ranked.iter().take(k).enumerate() {
        if qrels.get(id).copied().unwrap_or(0) > 0 {
            #[allow(clippy::cast_precision_loss)]
            return 1.0 / (i + 1) as f64;
        }
    }
    0.0
}

/// NDCG@k with gain `2^rel − 1` and discount `log2(i + 2)`. The ideal
/// ordering is the query's qrel scores sorted descending, truncated to k.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ndcg(ranked: &[String], qrels: &HashMap<String, i32>, k: usize) -> f64 {
    let gain = |rel: i32| -> f64 {
        if rel <= 0 {
            0.0
        } else {
            2f64.powi(rel) - 1.0
        }
    };
    let discount = |i: usize| (i as f64 + 2.0).log2();

    let dcg: f64 = ranked
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, id)| gain(qrels.get(id).copied().unwrap_or(0)) / discount(i))
        .sum();

    let mut ideal: Vec<i32> = qrels.values().copied().collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, rel)| gain(*rel) / discount(i))
        .sum();

    if idcg == 0.0 { 0.0 } else { dcg / idcg }
}

/// Fraction of the query's positive ids found in the top-k. `None` when the
/// query has no positives, so callers can skip it in the average.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recall(ranked: &[String], qrels: &HashMap<String, i32>, k: usize) -> Option<f64> {
    let positives: HashSet<&str> = qrels
        .iter()
        .filter(|(_, score)| **score > 0)
        .map(|(id, _)| id.as_str())
        .collect();
    if positives.is_empty() {
        return None;
    }
    let hits = ranked
        .iter()
        .take(k)
        .filter(|id| positives.contains(id.as_str()))
        .count();
    Some(hits as f64 / positives.len() as f64)
}
