//! Greedy batch packing for embedding requests.

use std::ops::Range;

/// Chars-per-token estimate used for packing decisions. Deliberately tighter
/// than the chunker's estimate so a packed batch stays under the backend's
/// real token limit even for dense content.
const PACK_CHARS_PER_TOKEN: usize = 3;

/// Estimated token cost of one text for packing purposes.
#[must_use]
pub fn packing_tokens(text: &str) -> usize {
    text.len().div_ceil(PACK_CHARS_PER_TOKEN)
}

/// Pack `texts` into contiguous index ranges, each respecting `max_texts` and
/// the optional `max_tokens` budget.
///
/// A single text whose estimate alone exceeds the budget is shipped as its own
/// batch; the backend is expected to truncate it, and the remaining inputs
/// keep flowing.
#[must_use]
pub fn pack_batches(
    texts: &[String],
    max_texts: usize,
    max_tokens: Option<usize>,
) -> Vec<Range<usize>> {
    let max_texts = max_texts.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut tokens = 0;

    for (i, text) in texts.iter().enumerate() {
        let cost = packing_tokens(text);
        let over_count = count >= max_texts;
        let over_budget = max_tokens.is_some_and(|budget| tokens + cost > budget);

        if count > 0 && (over_count || over_budget) {
            batches.push(start..i);
            start = i;
            count = 0;
            tokens = 0;
        }

        count += 1;
        tokens += cost;
    }

    if count > 0 {
        batches.push(start..texts.len());
    }

    batches
}
