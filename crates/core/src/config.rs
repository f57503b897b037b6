//! Index configuration: BM25 parameters, tokeniser options, and engine
//! tuning defaults.
//!
//! An [`IndexConfig`] is persisted alongside the index it created, so a
//! reopened index keeps tokenising exactly as it did at build time. Runtime
//! knobs that do not affect persisted state (`top_k`, `top_k_token`, query
//! batch size, deadlines) live in the per-call search options instead.

use crate::error::EngineError;
use crate::tokenize::{Stemmer, Stopwords};
use serde::{Deserialize, Serialize};

/// BM25 term frequency saturation parameter.
///
/// Controls how quickly term frequency saturates. Higher values allow TF to
/// grow more. Default is 1.5.
pub const DEFAULT_K1: f32 = 1.5;

/// BM25 document length normalization parameter.
///
/// 0.0 = no normalization, 1.0 = full normalization. Default is 0.75.
pub const DEFAULT_B: f32 = 0.75;

/// Default ignore pattern: dots and anything outside `[a-z]` are replaced
/// with whitespace before splitting.
pub const DEFAULT_IGNORE: &str = "(\\.|[^a-z])+";

/// Default number of records per ingest batch.
pub const DEFAULT_INGEST_BATCH: u32 = 30_000;

/// Default number of queries per search batch.
pub const DEFAULT_QUERY_BATCH: u32 = 32;

/// Default number of results returned per query.
pub const DEFAULT_TOP_K: usize = 10;

/// Default posting-list slice length consulted per query term.
///
/// Raising it trades latency for exactness; setting it at or above the
/// largest document frequency among the queried terms recovers exact BM25
/// ranking.
pub const DEFAULT_TOP_K_TOKEN: usize = 30_000;

/// Default posting-list slice length on the graph path, where two executors
/// run per input query.
pub const DEFAULT_GRAPH_TOP_K_TOKEN: usize = 10_000;

/// Maximum retry attempts for transient backend contention.
pub const RETRY_ATTEMPTS: u32 = 20;

/// Spacing between transient-error retries, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 100;

/// Settings for one index schema (documents or stored queries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// BM25 `k1` (term frequency saturation).
    pub k1: f32,
    /// BM25 `b` (document length normalization).
    pub b: f32,
    /// Stemming algorithm applied to surviving terms.
    pub stemmer: Stemmer,
    /// Stopword source: named language or explicit list.
    pub stopwords: Stopwords,
    /// Regex whose matches are blanked before splitting. Empty disables it.
    pub ignore: String,
    /// Lowercase text before any other step.
    pub lower: bool,
    /// Unicode NFKD + combining mark removal.
    pub strip_accents: bool,
    /// Records per ingest batch (parallelism unit during tokenisation).
    pub batch_size: u32,
    /// Worker threads: positive = exact count, anything else = all cores.
    pub n_jobs: i32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            stemmer: Stemmer::default(),
            stopwords: Stopwords::default(),
            ignore: DEFAULT_IGNORE.to_string(),
            lower: true,
            strip_accents: true,
            batch_size: DEFAULT_INGEST_BATCH,
            n_jobs: -1,
        }
    }
}

impl IndexConfig {
    /// Reject illegal parameter values before any state is touched.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.k1.is_finite() || self.k1 <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "k1 must be a positive finite number, got {}",
                self.k1
            )));
        }
        if !self.b.is_finite() || !(0.0..=1.0).contains(&self.b) {
            return Err(EngineError::InvalidInput(format!(
                "b must be within [0, 1], got {}",
                self.b
            )));
        }
        if self.batch_size == 0 {
            return Err(EngineError::InvalidInput(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if !self.ignore.is_empty() {
            regex::Regex::new(&self.ignore).map_err(|e| {
                EngineError::InvalidInput(format!("malformed ignore pattern: {e}"))
            })?;
        }
        self.stopwords.surfaces().map(|_| ())
    }

    /// Effective worker count for the configured `n_jobs`.
    pub fn jobs(&self) -> usize {
        if self.n_jobs > 0 {
            self.n_jobs as usize
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
