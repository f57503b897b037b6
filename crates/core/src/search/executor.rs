//! Batch query executor.
//!
//! Queries are tokenised with the same pipeline as documents, then answered
//! from the score store alone: for every term in the query multiset the
//! executor reads at most `top_k_token` positions of that term's scored
//! posting list and accumulates per-document sums. Terms missing from the
//! dictionary contribute nothing. Candidates then pass the optional filter
//! predicate and the best `top_k` survive.
//!
//! Truncating slices at `top_k_token` makes the top-k approximate: a
//! document scoring only in deep posting-list tails can be missed. Slices
//! at least as long as the largest queried df are exact.

use crate::search::filter::{column_ordering, matches_filter};
use crate::search::{QueryResult, SearchHit, SearchOptions};
use crate::storage::engine::SchemaData;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Instant;

/// Execute a batch of queries against one schema. Queries within a batch are
/// independent; batches beyond `batch_size` run in parallel on the caller's
/// rayon pool. Result order matches the input order.
pub(crate) fn execute_batch(
    schema: &SchemaData,
    queries: &[String],
    opts: &SearchOptions,
    deadline: Option<Instant>,
) -> Vec<QueryResult> {
    let batch = opts.batch_size.max(1);
    if queries.len() <= batch {
        queries
            .iter()
            .map(|q| run_query(schema, q, opts, deadline))
            .collect()
    } else {
        queries
            .par_chunks(batch)
            .flat_map_iter(|chunk| chunk.iter().map(|q| run_query(schema, q, opts, deadline)))
            .collect()
    }
}

fn run_query(
    schema: &SchemaData,
    query: &str,
    opts: &SearchOptions,
    deadline: Option<Instant>,
) -> QueryResult {
    let (scores, partial) = accumulate(schema, query, opts.top_k_token, deadline);

    let keep = |doc_id: u32| -> bool {
        match (&opts.filter, schema.docs.get(doc_id)) {
            (Some(filter), Some(entry)) => matches_filter(&entry.row, filter),
            (None, Some(_)) => true,
            (_, None) => false,
        }
    };

    let ranked = match &opts.order_by {
        Some(order) => {
            let mut candidates: Vec<(u32, f32)> =
                scores.into_iter().filter(|&(d, _)| keep(d)).collect();
            candidates.sort_unstable_by(|a, b| {
                let col_a = schema.docs.get(a.0).and_then(|e| e.row.get(&order.field));
                let col_b = schema.docs.get(b.0).and_then(|e| e.row.get(&order.field));
                let by_column = if order.descending {
                    column_ordering(col_b, col_a)
                } else {
                    column_ordering(col_a, col_b)
                };
                by_column
                    .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| a.0.cmp(&b.0))
            });
            candidates.truncate(opts.top_k);
            candidates
        }
        None => top_k_scores(scores, opts.top_k, keep),
    };

    QueryResult {
        hits: hydrate(schema, &ranked),
        partial,
    }
}

/// Accumulate per-document score sums for one query. Returns the partial
/// flag set when the deadline expired before all term slices were read.
pub(crate) fn accumulate(
    schema: &SchemaData,
    query: &str,
    top_k_token: usize,
    deadline: Option<Instant>,
) -> (HashMap<u32, f32>, bool) {
    let terms = schema.tokenizer().tokenize(query);
    let mut scores: HashMap<u32, f32> = HashMap::new();
    let mut partial = false;

    // The query is a multiset: a repeated term accumulates its slice twice.
    for term in &terms {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            partial = true;
            break;
        }
        let Some(term_id) = schema.dictionary.lookup(term) else {
            continue;
        };
        let Some((docs, term_scores)) = schema.scores.slice(term_id, top_k_token) else {
            continue;
        };
        for (doc_id, score) in docs.iter().zip(term_scores) {
            *scores.entry(*doc_id).or_insert(0.0) += *score;
        }
    }
    (scores, partial)
}

/// Select the `k` best candidates by score descending, ascending doc id on
/// ties. Partial sort via a min-heap of size k, then a final ordering pass.
pub(crate) fn top_k_scores(
    scores: HashMap<u32, f32>,
    k: usize,
    keep: impl Fn(u32) -> bool,
) -> Vec<(u32, f32)> {
    let mut heap: std::collections::BinaryHeap<Reverse<(OrderedFloat<f32>, Reverse<u32>)>> =
        std::collections::BinaryHeap::with_capacity(k + 1);
    for (doc_id, score) in scores {
        if !keep(doc_id) {
            continue;
        }
        heap.push(Reverse((OrderedFloat(score), Reverse(doc_id))));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut results: Vec<(u32, f32)> = heap
        .into_iter()
        .map(|Reverse((s, Reverse(id)))| (id, s.0))
        .collect();
    results.sort_unstable_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    results
}

/// Attach keys and stored rows to ranked (doc_id, score) pairs.
pub(crate) fn hydrate(schema: &SchemaData, ranked: &[(u32, f32)]) -> Vec<SearchHit> {
    ranked
        .iter()
        .filter_map(|&(doc_id, score)| {
            schema.docs.get(doc_id).map(|entry| SearchHit {
                key: entry.external_key.clone(),
                score,
                row: entry.row.clone(),
            })
        })
        .collect()
}
