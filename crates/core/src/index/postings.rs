//! Posting store: the set of `(doc_id, term_id, tf)` tuples.
//!
//! Two views are maintained in lockstep: by term (consumed by score
//! rebuilds) and by doc (consumed by the deleter to find affected terms).
//! Each (doc, term) pair appears at most once and always with `tf > 0`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single entry in a term's postings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Internal dense document id.
    pub doc_id: u32,
    /// Raw term frequency within the document.
    pub tf: u32,
}

/// Raw term-frequency tuples with by-term and by-doc iteration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PostingStore {
    by_term: HashMap<u32, Vec<Posting>>,
    by_doc: HashMap<u32, Vec<(u32, u32)>>,
}

impl PostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert all postings for one document. `term_tfs` must not repeat a
    /// term id; zero frequencies are discarded.
    pub fn insert_many(&mut self, doc_id: u32, term_tfs: &[(u32, u32)]) {
        let doc_entry = self.by_doc.entry(doc_id).or_default();
        for &(term_id, tf) in term_tfs {
            if tf == 0 {
                continue;
            }
            self.by_term
                .entry(term_id)
                .or_default()
                .push(Posting { doc_id, tf });
            doc_entry.push((term_id, tf));
        }
    }

    /// Drop every posting of `doc_id`, returning the term ids it touched.
    pub fn delete_by_doc(&mut self, doc_id: u32) -> Vec<u32> {
        let Some(terms) = self.by_doc.remove(&doc_id) else {
            return Vec::new();
        };
        let mut affected = Vec::with_capacity(terms.len());
        for (term_id, _) in terms {
            if let Some(postings) = self.by_term.get_mut(&term_id) {
                postings.retain(|p| p.doc_id != doc_id);
                if postings.is_empty() {
                    self.by_term.remove(&term_id);
                }
            }
            affected.push(term_id);
        }
        affected
    }

    /// All `(doc, tf)` postings for a term.
    pub fn term_postings(&self, term_id: u32) -> Option<&[Posting]> {
        self.by_term.get(&term_id).map(|v| v.as_slice())
    }

    /// All `(term, tf)` postings of a document.
    pub fn doc_terms(&self, doc_id: u32) -> Option<&[(u32, u32)]> {
        self.by_doc.get(&doc_id).map(|v| v.as_slice())
    }

    /// Distinct documents containing the term (pairs are unique, so this is
    /// the postings-list length).
    pub fn term_doc_count(&self, term_id: u32) -> u32 {
        self.by_term.get(&term_id).map_or(0, |v| v.len() as u32)
    }

    /// Iterate term ids that currently have postings.
    pub fn terms(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_term.keys().copied()
    }

    /// Total number of stored (doc, term) pairs.
    pub fn len(&self) -> usize {
        self.by_term.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_term.is_empty()
    }
}
