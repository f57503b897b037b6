//! Document store: dense doc ids, external-key uniqueness, lengths, rows.
//!
//! Doc ids are never reused after deletion; graph edges referencing a
//! deleted document simply dangle and are skipped at query time rather than
//! repaired in cascade.

use crate::document::Row;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Stored per live document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    /// Caller-supplied primary key.
    pub external_key: String,
    /// Term count emitted by the tokenizer for this document's indexed text.
    pub length: u32,
    /// The user-facing record, shared with query hydration.
    pub row: Arc<Row>,
}

/// External key → dense doc id mapping with per-document length and row.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: HashMap<u32, DocEntry>,
    by_key: HashMap<String, u32>,
    next_doc_id: u32,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document, returning its new id. A duplicate external key
    /// returns the existing id untouched; the caller decides whether that is
    /// a skip or an update via delete + reinsert.
    pub fn create(&mut self, external_key: &str, length: u32, row: Arc<Row>) -> u32 {
        if let Some(&existing) = self.by_key.get(external_key) {
            return existing;
        }
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;
        self.by_key.insert(external_key.to_string(), doc_id);
        self.docs.insert(
            doc_id,
            DocEntry {
                external_key: external_key.to_string(),
                length,
                row,
            },
        );
        doc_id
    }

    /// Remove a document, freeing its external key. The doc id is not
    /// reused. Returns the removed entry, or `None` if the id was not live.
    pub fn delete(&mut self, doc_id: u32) -> Option<DocEntry> {
        let entry = self.docs.remove(&doc_id)?;
        self.by_key.remove(&entry.external_key);
        Some(entry)
    }

    pub fn get(&self, doc_id: u32) -> Option<&DocEntry> {
        self.docs.get(&doc_id)
    }

    /// Tokenised length of a live document.
    pub fn get_length(&self, doc_id: u32) -> Option<u32> {
        self.docs.get(&doc_id).map(|e| e.length)
    }

    /// Overwrite a live document's length (used when the tokeniser
    /// configuration changes and the corpus is re-tokenised in place).
    pub fn set_length(&mut self, doc_id: u32, length: u32) {
        if let Some(entry) = self.docs.get_mut(&doc_id) {
            entry.length = length;
        }
    }

    pub fn contains_key(&self, external_key: &str) -> bool {
        self.by_key.contains_key(external_key)
    }

    pub fn lookup_key(&self, external_key: &str) -> Option<u32> {
        self.by_key.get(external_key).copied()
    }

    /// Resolve external keys to live doc ids; unknown keys are dropped.
    pub fn list_by_keys(&self, keys: &[String]) -> Vec<u32> {
        keys.iter()
            .filter_map(|k| self.by_key.get(k).copied())
            .collect()
    }

    /// Live document count.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Iterate live `(doc_id, entry)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &DocEntry)> {
        self.docs.iter().map(|(&id, e)| (id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str) -> Arc<Row> {
        Arc::new(Row::from_text(key, "text", "body"))
    }

    #[test]
    fn test_create_assigns_dense_ids() {
        let mut store = DocumentStore::new();
        assert_eq!(store.create("a", 3, row("a")), 0);
        assert_eq!(store.create("b", 2, row("b")), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_key_returns_existing_id() {
        let mut store = DocumentStore::new();
        let first = store.create("a", 3, row("a"));
        let second = store.create("a", 9, row("a"));
        assert_eq!(first, second);
        // Original entry untouched.
        assert_eq!(store.get_length(first), Some(3));
    }

    #[test]
    fn test_delete_frees_key_but_not_id() {
        let mut store = DocumentStore::new();
        let a = store.create("a", 3, row("a"));
        store.delete(a).unwrap();
        assert!(!store.contains_key("a"));
        // Re-inserting the same key gets a fresh id.
        let a2 = store.create("a", 3, row("a"));
        assert_ne!(a, a2);
    }

    #[test]
    fn test_delete_unknown_id_is_none() {
        let mut store = DocumentStore::new();
        assert!(store.delete(42).is_none());
    }

    #[test]
    fn test_list_by_keys_drops_unknown() {
        let mut store = DocumentStore::new();
        let a = store.create("a", 1, row("a"));
        let ids = store.list_by_keys(&["a".to_string(), "ghost".to_string()]);
        assert_eq!(ids, vec![a]);
    }
}
