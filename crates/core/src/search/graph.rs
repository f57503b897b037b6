//! Bipartite document↔query edges and the graph re-ranker.
//!
//! Stored queries are indexed as first-class documents in their own schema;
//! edges associate a document with a stored query and carry an interaction
//! weight. Re-ranking runs the plain executor twice (once over documents,
//! once over stored queries), then folds edge-adjacent query scores and
//! weights back into the document scores:
//!
//! `final(d) = bm25(d) + Σ over edges (d, q, w) with q retrieved: (score_q + w)`
//!
//! Documents reached only through an edge enter the candidate set with no
//! direct BM25 contribution. Edges whose document has since been deleted
//! dangle harmlessly; doc ids are never reused, so no cascading repair is
//! needed and dead endpoints are skipped here.

use crate::search::executor;
use crate::search::filter::matches_filter;
use crate::search::{GraphOptions, QueryResult};
use crate::storage::engine::EngineData;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Instant;

/// Caller-supplied edge between a document and a stored query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// External key of the document endpoint.
    pub document_key: String,
    /// Text of the stored query endpoint.
    pub query: String,
    /// Interaction weight; 1.0 when unspecified.
    pub weight: f32,
}

impl EdgeRecord {
    pub fn new(document_key: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            document_key: document_key.into(),
            query: query.into(),
            weight: 1.0,
        }
    }

    pub fn weighted(
        document_key: impl Into<String>,
        query: impl Into<String>,
        weight: f32,
    ) -> Self {
        Self {
            document_key: document_key.into(),
            query: query.into(),
            weight,
        }
    }
}

/// Weighted edges keyed by stored-query id, unique per (document, query).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EdgeStore {
    by_query: HashMap<u32, Vec<(u32, f32)>>,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the edge (document, query) → weight.
    pub fn upsert(&mut self, document_id: u32, query_id: u32, weight: f32) {
        let edges = self.by_query.entry(query_id).or_default();
        if let Some(slot) = edges.iter_mut().find(|(d, _)| *d == document_id) {
            slot.1 = weight;
        } else {
            edges.push((document_id, weight));
        }
    }

    /// All `(document_id, weight)` edges of a stored query.
    pub fn for_query(&self, query_id: u32) -> &[(u32, f32)] {
        self.by_query.get(&query_id).map_or(&[], |v| v.as_slice())
    }

    /// Stored-query ids that have at least one edge.
    pub fn query_endpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_query.keys().copied()
    }

    /// Total edge count.
    pub fn len(&self) -> usize {
        self.by_query.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query.is_empty()
    }
}

/// Execute the graph path for a batch of input queries.
pub(crate) fn execute_batch(
    data: &EngineData,
    queries: &[String],
    opts: &GraphOptions,
    deadline: Option<Instant>,
) -> Vec<QueryResult> {
    let batch = opts.batch_size.max(1);
    if queries.len() <= batch {
        queries
            .iter()
            .map(|q| run_graph_query(data, q, opts, deadline))
            .collect()
    } else {
        queries
            .par_chunks(batch)
            .flat_map_iter(|chunk| chunk.iter().map(|q| run_graph_query(data, q, opts, deadline)))
            .collect()
    }
}

fn run_graph_query(
    data: &EngineData,
    query: &str,
    opts: &GraphOptions,
    deadline: Option<Instant>,
) -> QueryResult {
    let keep_doc = |doc_id: u32| -> bool {
        match (&opts.filter, data.documents.docs.get(doc_id)) {
            (Some(filter), Some(entry)) => matches_filter(&entry.row, filter),
            (None, Some(_)) => true,
            (_, None) => false,
        }
    };

    // Direct BM25 candidates over documents.
    let (doc_scores, partial_docs) =
        executor::accumulate(&data.documents, query, opts.top_k_token, deadline);
    let bd = executor::top_k_scores(doc_scores, opts.top_k, &keep_doc);

    // BM25 over the stored-query index.
    let (query_scores, partial_queries) =
        executor::accumulate(&data.queries, query, opts.top_k_token, deadline);
    let bq = executor::top_k_scores(query_scores, opts.top_k, |q| {
        data.queries.docs.get(q).is_some()
    });

    // Recombine: documents adjacent to a retrieved query gain its score
    // plus the edge weight, whether or not BM25 retrieved them directly.
    let mut final_scores: HashMap<u32, f32> = bd.into_iter().collect();
    for (query_id, query_score) in bq {
        for &(doc_id, weight) in data.edges.for_query(query_id) {
            if !keep_doc(doc_id) {
                continue;
            }
            *final_scores.entry(doc_id).or_insert(0.0) += query_score + weight;
        }
    }

    let ranked = if opts.random_tiebreak {
        top_k_random_ties(final_scores, opts.top_k)
    } else {
        executor::top_k_scores(final_scores, opts.top_k, |_| true)
    };

    QueryResult {
        hits: executor::hydrate(&data.documents, &ranked),
        partial: partial_docs || partial_queries,
    }
}

/// Top-k selection with a random permutation among score-equal documents.
fn top_k_random_ties(scores: HashMap<u32, f32>, k: usize) -> Vec<(u32, f32)> {
    let mut heap: std::collections::BinaryHeap<Reverse<(OrderedFloat<f32>, u64, u32)>> =
        std::collections::BinaryHeap::with_capacity(k + 1);
    for (doc_id, score) in scores {
        heap.push(Reverse((OrderedFloat(score), rand::random::<u64>(), doc_id)));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut results: Vec<(OrderedFloat<f32>, u64, u32)> =
        heap.into_iter().map(|Reverse(t)| t).collect();
    results.sort_unstable_by(|a, b| b.cmp(a));
    results
        .into_iter()
        .map(|(score, _, doc_id)| (doc_id, score.0))
        .collect()
}
