//! Search primitives: result types, per-call options, batch execution, row
//! filtering, and the graph re-ranker.

/// Batch query executor over one index schema.
pub mod executor;
/// Row-predicate evaluation for filter clauses.
pub mod filter;
/// Edge store and the bipartite document↔query re-ranker.
pub mod graph;

pub use graph::{EdgeRecord, EdgeStore};

use crate::config::{
    DEFAULT_GRAPH_TOP_K_TOKEN, DEFAULT_QUERY_BATCH, DEFAULT_TOP_K, DEFAULT_TOP_K_TOKEN,
};
use crate::document::Row;
use crate::filter_types::{FilterClause, OrderBy};
use std::sync::Arc;
use std::time::Duration;

/// A matched document with its relevance score and hydrated row.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Caller primary key of the matched document.
    pub key: String,
    /// BM25 score, or the recombined score on the graph path.
    pub score: f32,
    /// The stored record (shared reference).
    pub row: Arc<Row>,
}

/// Ranked hits for one input query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Up to `top_k` hits, best first.
    pub hits: Vec<SearchHit>,
    /// True when a deadline expired before every posting slice was
    /// consulted; the hits cover only the slices fetched so far.
    pub partial: bool,
}

/// Per-call options for document and stored-query search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of results per query.
    pub top_k: usize,
    /// Posting-list slice length consulted per query term.
    pub top_k_token: usize,
    /// Queries per batch (unit of parallel work).
    pub batch_size: usize,
    /// Structured predicate over row columns.
    pub filter: Option<FilterClause>,
    /// Ranking override over a row column.
    pub order_by: Option<OrderBy>,
    /// Wall-clock budget for the whole call.
    pub deadline: Option<Duration>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            top_k_token: DEFAULT_TOP_K_TOKEN,
            batch_size: DEFAULT_QUERY_BATCH as usize,
            filter: None,
            order_by: None,
            deadline: None,
        }
    }
}

/// Per-call options for the graph re-ranking path.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Number of results per query after recombination.
    pub top_k: usize,
    /// Posting-list slice length for both underlying executors.
    pub top_k_token: usize,
    /// Queries per batch.
    pub batch_size: usize,
    /// Structured predicate over document row columns.
    pub filter: Option<FilterClause>,
    /// Wall-clock budget for the whole call.
    pub deadline: Option<Duration>,
    /// Break score ties randomly instead of by ascending doc id, for
    /// result diversity.
    pub random_tiebreak: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            top_k_token: DEFAULT_GRAPH_TOP_K_TOKEN,
            batch_size: DEFAULT_QUERY_BATCH as usize,
            filter: None,
            deadline: None,
            random_tiebreak: false,
        }
    }
}
