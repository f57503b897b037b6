//! Precomputed BM25 score store and the scoring kernel.
//!
//! For each term the store materialises two parallel arrays `docs[]` and
//! `scores[]`, sorted by score descending with ascending doc id as the
//! tiebreak. The hot query path then reduces to slicing the first
//! `top_k_token` positions of each queried term; a struct-of-arrays layout
//! keeps that slice a plain pointer range.
//!
//! Entries are rebuilt from the posting store whenever their term gains or
//! loses a document. Terms untouched by an ingest keep arrays computed with
//! the previous `avgdl`; that drift is bounded by corpus growth and does not
//! reorder documents within a term.

use crate::index::postings::Posting;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-term scored posting list as parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Document ids, aligned with `scores`.
    pub docs: Vec<u32>,
    /// BM25 term-document scores, descending.
    pub scores: Vec<f32>,
}

impl ScoreEntry {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Inverse document frequency:
/// `ln(((N − df + 0.5) / (df + 0.5)) + 1)`.
pub fn idf(num_docs: u32, df: u32) -> f32 {
    ((num_docs as f32 - df as f32 + 0.5) / (df as f32 + 0.5) + 1.0).ln()
}

/// BM25 score of one (term, document) pair:
/// `tf · idf / (tf + k1 · (1 − b + b · len / avgdl))`.
pub fn term_score(tf: u32, idf: f32, doc_len: u32, avgdl: f32, k1: f32, b: f32) -> f32 {
    let tf = tf as f32;
    let norm = k1 * (1.0 - b + b * doc_len as f32 / avgdl);
    tf * idf / (tf + norm)
}

/// Score a term's postings into a fresh entry using the current corpus
/// statistics. `doc_length` resolves live document lengths; postings whose
/// document has vanished are skipped.
pub fn score_postings(
    postings: &[Posting],
    doc_length: impl Fn(u32) -> Option<u32>,
    num_docs: u32,
    avgdl: f32,
    k1: f32,
    b: f32,
) -> ScoreEntry {
    let term_idf = idf(num_docs, postings.len() as u32);
    let mut pairs: Vec<(u32, f32)> = postings
        .iter()
        .filter_map(|p| {
            let len = doc_length(p.doc_id)?;
            Some((p.doc_id, term_score(p.tf, term_idf, len, avgdl, k1, b)))
        })
        .collect();
    pairs.sort_unstable_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut entry = ScoreEntry {
        docs: Vec::with_capacity(pairs.len()),
        scores: Vec::with_capacity(pairs.len()),
    };
    for (doc_id, score) in pairs {
        entry.docs.push(doc_id);
        entry.scores.push(score);
    }
    entry
}

/// All per-term score entries of one schema.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScoreStore {
    entries: HashMap<u32, ScoreEntry>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a term's entry; an empty rebuilt entry removes it instead.
    pub fn replace(&mut self, term_id: u32, entry: ScoreEntry) {
        if entry.is_empty() {
            self.entries.remove(&term_id);
        } else {
            self.entries.insert(term_id, entry);
        }
    }

    pub fn remove(&mut self, term_id: u32) {
        self.entries.remove(&term_id);
    }

    /// The first `limit` positions of a term's arrays, highest scores first.
    pub fn slice(&self, term_id: u32, limit: usize) -> Option<(&[u32], &[f32])> {
        let entry = self.entries.get(&term_id)?;
        let n = limit.min(entry.docs.len());
        Some((&entry.docs[..n], &entry.scores[..n]))
    }

    pub fn get(&self, term_id: u32) -> Option<&ScoreEntry> {
        self.entries.get(&term_id)
    }

    /// Term ids that currently have an entry.
    pub fn terms(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Term ids whose entry references any of the given doc ids.
    pub fn terms_referencing(&self, doc_ids: &std::collections::HashSet<u32>) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.docs.iter().any(|d| doc_ids.contains(d)))
            .map(|(&t, _)| t)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ScoreEntry)> {
        self.entries.iter().map(|(&t, e)| (t, e))
    }
}
