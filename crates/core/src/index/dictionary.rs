//! Term dictionary: stable integer ids and document frequencies.
//!
//! Ids are dense, assigned at first sight, and never reused; a term whose
//! `df` drops to zero keeps its id so posting and score references elsewhere
//! stay valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One dictionary entry, indexed by its dense term id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermEntry {
    /// Normalised surface form.
    pub surface: String,
    /// Number of distinct live documents containing the term.
    pub df: u32,
}

/// Surface → term id interning with df maintenance.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TermDictionary {
    terms: Vec<TermEntry>,
    by_surface: HashMap<String, u32>,
}

impl TermDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `surface`, assigning the next dense id on first
    /// sight. New entries start with `df = 0`; the indexer bumps df once the
    /// term's postings land.
    pub fn intern(&mut self, surface: &str) -> u32 {
        if let Some(&id) = self.by_surface.get(surface) {
            return id;
        }
        let id = self.terms.len() as u32;
        self.terms.push(TermEntry {
            surface: surface.to_string(),
            df: 0,
        });
        self.by_surface.insert(surface.to_string(), id);
        id
    }

    /// Id lookup without interning.
    pub fn lookup(&self, surface: &str) -> Option<u32> {
        self.by_surface.get(surface).copied()
    }

    /// `df ← max(0, df + delta)`.
    pub fn bump_df(&mut self, term_id: u32, delta: i32) {
        if let Some(entry) = self.terms.get_mut(term_id as usize) {
            entry.df = entry.df.saturating_add_signed(delta);
        }
    }

    /// Current document frequency; 0 for unknown ids.
    pub fn df(&self, term_id: u32) -> u32 {
        self.terms.get(term_id as usize).map_or(0, |e| e.df)
    }

    /// Surface form for a term id.
    pub fn surface(&self, term_id: u32) -> Option<&str> {
        self.terms.get(term_id as usize).map(|e| e.surface.as_str())
    }

    /// Number of terms ever interned (ids are dense in `0..len`).
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate `(term_id, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &TermEntry)> {
        self.terms.iter().enumerate().map(|(i, e)| (i as u32, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut dict = TermDictionary::new();
        let a = dict.intern("cat");
        let b = dict.intern("dog");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(dict.intern("cat"), a);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_intern() {
        let dict = TermDictionary::new();
        assert_eq!(dict.lookup("missing"), None);
        assert_eq!(dict.len(), 0);
    }

    #[test]
    fn test_bump_df_floors_at_zero() {
        let mut dict = TermDictionary::new();
        let id = dict.intern("cat");
        dict.bump_df(id, 2);
        assert_eq!(dict.df(id), 2);
        dict.bump_df(id, -5);
        assert_eq!(dict.df(id), 0);
    }

    #[test]
    fn test_zero_df_term_keeps_its_id() {
        let mut dict = TermDictionary::new();
        let cat = dict.intern("cat");
        dict.bump_df(cat, 1);
        dict.bump_df(cat, -1);
        assert_eq!(dict.lookup("cat"), Some(cat));
        assert_eq!(dict.surface(cat), Some("cat"));
    }
}
