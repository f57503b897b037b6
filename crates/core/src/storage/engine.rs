//! Engine state and the public operation surface.
//!
//! [`SchemaData`] assembles one index schema: dictionary, document store,
//! posting store, score store, corpus statistics, and the settings the
//! schema was built with. [`EngineData`] holds the two parallel schemas
//! (documents and stored queries) plus the edge store. [`SearchEngine`]
//! wraps the whole thing in an `Arc<RwLock>` for single-writer /
//! many-reader access and optionally journals mutations to a WAL.
//!
//! Write operations hold the write lock for the full logical operation, so
//! readers observe either the pre- or post-operation snapshot, never a mix.

use crate::config::IndexConfig;
use crate::document::Row;
use crate::error::{with_retry, EngineError};
use crate::index::scores::{score_postings, ScoreEntry};
use crate::index::{CorpusStats, DocumentStore, PostingStore, ScoreStore, TermDictionary};
use crate::search::executor;
use crate::search::graph::{self, EdgeRecord, EdgeStore};
use crate::search::{GraphOptions, QueryResult, SearchOptions};
use crate::storage::persistence;
use crate::storage::wal::{SchemaKind, SyncWriteAheadLog, WalEntry};
use crate::tokenize::{Stopwords, Tokenizer};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Column under which stored-query text is kept in the query schema.
pub const QUERY_TEXT_FIELD: &str = "query";

/// Summary returned by upload operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Rows newly indexed.
    pub inserted: usize,
    /// Rows skipped because their external key already existed.
    pub skipped: usize,
    /// Malformed rows (e.g. empty key) dropped without aborting the batch.
    pub failed: usize,
    /// Edges inserted (query uploads only).
    pub edges: usize,
}

/// One index schema: everything needed to ingest, delete, and answer
/// queries over a corpus.
#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaData {
    /// Settings this schema was built with; persisted so a reopened index
    /// tokenises exactly as it did at build time.
    pub settings: IndexConfig,
    /// Row fields concatenated into the indexed text, fixed on first ingest.
    pub indexed_fields: Vec<String>,
    pub dictionary: TermDictionary,
    pub docs: DocumentStore,
    pub postings: PostingStore,
    pub scores: ScoreStore,
    pub stats: CorpusStats,
    #[serde(skip)]
    tokenizer: Tokenizer,
}

impl SchemaData {
    pub fn new(settings: IndexConfig) -> Result<Self, EngineError> {
        settings.validate()?;
        let tokenizer = Tokenizer::new(&settings)?;
        Ok(Self {
            settings,
            indexed_fields: Vec::new(),
            dictionary: TermDictionary::new(),
            docs: DocumentStore::new(),
            postings: PostingStore::new(),
            scores: ScoreStore::new(),
            stats: CorpusStats::default(),
            tokenizer,
        })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Rebuild the transient tokenizer from persisted settings after
    /// deserialization.
    pub(crate) fn rebuild_tokenizer(&mut self) -> Result<(), EngineError> {
        self.tokenizer = Tokenizer::new(&self.settings)?;
        Ok(())
    }

    /// Ingest rows: dedup by key, tokenise in parallel batches, write
    /// documents and postings, refresh statistics, and rebuild score
    /// entries for every affected term. Visible atomically to readers
    /// because the caller holds the write lock throughout.
    pub fn ingest(&mut self, rows: Vec<Row>, fields: &[String]) -> UploadReport {
        let mut report = UploadReport::default();

        if self.indexed_fields.is_empty() {
            self.indexed_fields = fields.to_vec();
        } else if fields != self.indexed_fields {
            tracing::warn!(
                "indexed fields {:?} differ from stored {:?}; keeping stored fields",
                fields,
                self.indexed_fields
            );
        }

        // Dedup against the store and within the input; first occurrence wins.
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            if row.key.is_empty() {
                report.failed += 1;
                continue;
            }
            if self.docs.contains_key(&row.key) || !seen.insert(row.key.clone()) {
                report.skipped += 1;
                continue;
            }
            pending.push(row);
        }

        // Tokenise in parallel over batches.
        let batch = self.settings.batch_size.max(1) as usize;
        let fields = self.indexed_fields.clone();
        let products: Vec<(u32, Vec<(String, u32)>)> = {
            let tokenizer = &self.tokenizer;
            pending
                .par_chunks(batch)
                .flat_map_iter(|chunk| {
                    chunk.iter().map(|row| {
                        let text = row.indexed_text(&fields);
                        let terms = tokenizer.tokenize(&text);
                        let length = terms.len() as u32;
                        let mut tf: HashMap<String, u32> = HashMap::new();
                        for term in terms {
                            *tf.entry(term).or_insert(0) += 1;
                        }
                        (length, tf.into_iter().collect::<Vec<_>>())
                    })
                })
                .collect()
        };

        // Apply: rows, postings, df deltas, statistics.
        let mut affected: HashSet<u32> = HashSet::new();
        for (row, (length, term_tfs)) in pending.into_iter().zip(products) {
            let key = row.key.clone();
            let doc_id = self.docs.create(&key, length, Arc::new(row));
            let ids: Vec<(u32, u32)> = term_tfs
                .iter()
                .map(|(surface, tf)| (self.dictionary.intern(surface), *tf))
                .collect();
            for &(term_id, _) in &ids {
                self.dictionary.bump_df(term_id, 1);
                affected.insert(term_id);
            }
            self.postings.insert_many(doc_id, &ids);
            self.stats.add_doc(length);
            report.inserted += 1;
        }

        self.rebuild_terms(&affected);
        report
    }

    /// Delete documents by external key: drop postings and lengths, repair
    /// df, refresh statistics, and rebuild every term whose score entry
    /// referenced a deleted document. Unknown keys are a no-op.
    pub fn delete(&mut self, keys: &[String]) -> usize {
        let doc_ids = self.docs.list_by_keys(keys);
        if doc_ids.is_empty() {
            return 0;
        }
        let deleted: HashSet<u32> = doc_ids.iter().copied().collect();
        let mut affected = self.scores.terms_referencing(&deleted);

        for &doc_id in &doc_ids {
            for term_id in self.postings.delete_by_doc(doc_id) {
                self.dictionary.bump_df(term_id, -1);
                affected.push(term_id);
            }
            if let Some(entry) = self.docs.delete(doc_id) {
                self.stats.remove_doc(entry.length);
            }
        }

        let affected: HashSet<u32> = affected.into_iter().collect();
        self.rebuild_terms(&affected);
        doc_ids.len()
    }

    /// Replace the stopword set and re-tokenise the whole corpus so the
    /// index keeps matching what the tokenizer now produces.
    pub fn set_stopwords(&mut self, stopwords: Vec<String>) -> Result<(), EngineError> {
        let source = Stopwords::List(stopwords);
        let surfaces = source.surfaces()?;
        self.settings.stopwords = source;
        self.tokenizer.set_stopwords(surfaces);
        self.reindex_all();
        Ok(())
    }

    /// Recompute score entries for the given terms from the current posting
    /// store and statistics, in parallel over terms. Terms left without
    /// postings lose their entry.
    fn rebuild_terms(&mut self, affected: &HashSet<u32>) {
        if affected.is_empty() {
            return;
        }
        let num_docs = self.stats.num_docs;
        let avgdl = self.stats.avgdl();
        let (k1, b) = (self.settings.k1, self.settings.b);
        let postings = &self.postings;
        let docs = &self.docs;

        let rebuilt: Vec<(u32, ScoreEntry)> = affected
            .par_iter()
            .map(|&term_id| {
                let entry = match postings.term_postings(term_id) {
                    Some(ps) => {
                        score_postings(ps, |d| docs.get_length(d), num_docs, avgdl, k1, b)
                    }
                    None => ScoreEntry::default(),
                };
                (term_id, entry)
            })
            .collect();

        for (term_id, entry) in rebuilt {
            self.scores.replace(term_id, entry);
        }
    }

    /// Re-tokenise every live document in place. Term ids stay stable; df,
    /// postings, lengths, statistics, and all score entries are rebuilt.
    fn reindex_all(&mut self) {
        let stale_terms: Vec<u32> = self.scores.terms().collect();
        for term_id in stale_terms {
            self.scores.remove(term_id);
        }
        for term_id in 0..self.dictionary.len() as u32 {
            let df = self.dictionary.df(term_id);
            self.dictionary.bump_df(term_id, -(df as i32));
        }
        self.postings = PostingStore::new();
        self.stats = CorpusStats::default();

        let fields = self.indexed_fields.clone();
        let snapshot: Vec<(u32, Arc<Row>)> = self
            .docs
            .iter()
            .map(|(id, entry)| (id, entry.row.clone()))
            .collect();

        let batch = self.settings.batch_size.max(1) as usize;
        let products: Vec<(u32, u32, Vec<(String, u32)>)> = {
            let tokenizer = &self.tokenizer;
            snapshot
                .par_chunks(batch)
                .flat_map_iter(|chunk| {
                    chunk.iter().map(|(doc_id, row)| {
                        let terms = tokenizer.tokenize(&row.indexed_text(&fields));
                        let length = terms.len() as u32;
                        let mut tf: HashMap<String, u32> = HashMap::new();
                        for term in terms {
                            *tf.entry(term).or_insert(0) += 1;
                        }
                        (*doc_id, length, tf.into_iter().collect::<Vec<_>>())
                    })
                })
                .collect()
        };

        let mut affected: HashSet<u32> = HashSet::new();
        for (doc_id, length, term_tfs) in products {
            let ids: Vec<(u32, u32)> = term_tfs
                .iter()
                .map(|(surface, tf)| (self.dictionary.intern(surface), *tf))
                .collect();
            for &(term_id, _) in &ids {
                self.dictionary.bump_df(term_id, 1);
                affected.insert(term_id);
            }
            self.postings.insert_many(doc_id, &ids);
            self.docs.set_length(doc_id, length);
            self.stats.add_doc(length);
        }
        self.rebuild_terms(&affected);
    }

    /// Check the schema's structural invariants. Called after snapshot
    /// loads; any violation means the persisted state is corrupt.
    pub fn validate(&self) -> Result<(), String> {
        // Score entries: parallel arrays, ordering, liveness, uniqueness.
        for (term_id, entry) in self.scores.iter() {
            if entry.docs.len() != entry.scores.len() {
                return Err(format!(
                    "term {term_id}: docs({}) != scores({})",
                    entry.docs.len(),
                    entry.scores.len()
                ));
            }
            let mut seen = HashSet::with_capacity(entry.docs.len());
            for i in 0..entry.docs.len() {
                if !seen.insert(entry.docs[i]) {
                    return Err(format!(
                        "term {term_id}: duplicate doc {} in score entry",
                        entry.docs[i]
                    ));
                }
                if self.docs.get(entry.docs[i]).is_none() {
                    return Err(format!(
                        "term {term_id}: score entry references dead doc {}",
                        entry.docs[i]
                    ));
                }
                if i > 0 {
                    let (prev, cur) = (entry.scores[i - 1], entry.scores[i]);
                    if cur > prev {
                        return Err(format!("term {term_id}: scores not descending at {i}"));
                    }
                    if cur == prev && entry.docs[i] <= entry.docs[i - 1] {
                        return Err(format!(
                            "term {term_id}: doc tiebreak not ascending at {i}"
                        ));
                    }
                }
            }
        }

        // Statistics match the document store.
        if self.stats.num_docs as usize != self.docs.len() {
            return Err(format!(
                "stats num_docs {} != live docs {}",
                self.stats.num_docs,
                self.docs.len()
            ));
        }
        let total: u64 = self.docs.iter().map(|(_, e)| e.length as u64).sum();
        if total != self.stats.total_length {
            return Err(format!(
                "stats total_length {} != sum of lengths {}",
                self.stats.total_length, total
            ));
        }

        // df equals the distinct-document count in the posting store.
        for (term_id, entry) in self.dictionary.iter() {
            let count = self.postings.term_doc_count(term_id);
            if entry.df != count {
                return Err(format!(
                    "term {term_id} ('{}'): df {} != {} postings",
                    entry.surface, entry.df, count
                ));
            }
        }

        // Postings agree with re-tokenisation of each live document.
        for (doc_id, entry) in self.docs.iter() {
            let terms = self
                .tokenizer
                .tokenize(&entry.row.indexed_text(&self.indexed_fields));
            if terms.len() as u32 != entry.length {
                return Err(format!(
                    "doc {doc_id}: stored length {} != tokenised length {}",
                    entry.length,
                    terms.len()
                ));
            }
            let mut expected: HashMap<u32, u32> = HashMap::new();
            for term in &terms {
                let Some(term_id) = self.dictionary.lookup(term) else {
                    return Err(format!("doc {doc_id}: term '{term}' missing from dictionary"));
                };
                *expected.entry(term_id).or_insert(0) += 1;
            }
            let stored: HashMap<u32, u32> = self
                .postings
                .doc_terms(doc_id)
                .unwrap_or(&[])
                .iter()
                .copied()
                .collect();
            if expected != stored {
                return Err(format!("doc {doc_id}: postings disagree with tokenisation"));
            }
        }

        Ok(())
    }
}

/// Full engine state: both schemas plus the bipartite edge store.
#[derive(Debug, Serialize, Deserialize)]
pub struct EngineData {
    pub documents: SchemaData,
    pub queries: SchemaData,
    pub edges: EdgeStore,
}

impl EngineData {
    pub fn new(config: IndexConfig) -> Result<Self, EngineError> {
        Ok(Self {
            documents: SchemaData::new(config.clone())?,
            queries: SchemaData::new(config)?,
            edges: EdgeStore::new(),
        })
    }

    pub(crate) fn rebuild_tokenizers(&mut self) -> Result<(), EngineError> {
        self.documents.rebuild_tokenizer()?;
        self.queries.rebuild_tokenizer()
    }

    /// Ingest stored queries (keyed by their own text) and the supplied
    /// document↔query edges. Edges with an unknown endpoint are skipped.
    pub fn upload_queries(&mut self, queries: Vec<String>, edges: Vec<EdgeRecord>) -> UploadReport {
        let rows: Vec<Row> = queries
            .into_iter()
            .map(|q| Row::from_text(q.clone(), QUERY_TEXT_FIELD, q))
            .collect();
        let mut report = self
            .queries
            .ingest(rows, &[QUERY_TEXT_FIELD.to_string()]);

        for edge in edges {
            let Some(doc_id) = self.documents.docs.lookup_key(&edge.document_key) else {
                tracing::warn!(
                    "edge skipped: unknown document key '{}'",
                    edge.document_key
                );
                continue;
            };
            let Some(query_id) = self.queries.docs.lookup_key(&edge.query) else {
                tracing::warn!("edge skipped: unknown stored query '{}'", edge.query);
                continue;
            };
            self.edges.upsert(doc_id, query_id, edge.weight);
            report.edges += 1;
        }
        report
    }

    /// Validate both schemas and the edge store's query endpoints.
    /// Document endpoints are allowed to dangle (ids are never reused).
    pub fn validate(&self) -> Result<(), String> {
        self.documents.validate().map_err(|e| format!("documents: {e}"))?;
        self.queries.validate().map_err(|e| format!("queries: {e}"))?;
        for query_id in self.edges.query_endpoints() {
            if self.queries.docs.get(query_id).is_none() {
                return Err(format!("edges: unknown stored query id {query_id}"));
            }
        }
        Ok(())
    }
}

/// Thread-safe engine facade: single writer, many readers.
///
/// Built either purely in memory ([`SearchEngine::new`]) or durable
/// ([`SearchEngine::open`]) with a WAL replayed on top of the latest
/// snapshot. Cloning produces a new handle to the same shared state.
#[derive(Clone)]
pub struct SearchEngine {
    /// Engine state; take `read()` for queries, `write()` for mutations.
    pub data: Arc<RwLock<EngineData>>,
    wal: Option<Arc<SyncWriteAheadLog>>,
    data_dir: Option<PathBuf>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl SearchEngine {
    /// In-memory engine with no durability.
    pub fn new(config: IndexConfig) -> Result<Self, EngineError> {
        let pool = build_pool(&config)?;
        Ok(Self {
            data: Arc::new(RwLock::new(EngineData::new(config)?)),
            wal: None,
            data_dir: None,
            pool,
        })
    }

    /// Durable engine: loads the snapshot in `data_dir` if present, then
    /// replays the WAL on top. When a snapshot exists its stored settings
    /// win over `config`; a mismatch is logged, not an error.
    pub fn open(data_dir: impl AsRef<Path>, config: IndexConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let dir = data_dir.as_ref();

        let snapshot = persistence::snapshot_path(dir);
        let mut data = if snapshot.exists() {
            let loaded = with_retry("snapshot load", || persistence::load_engine(&snapshot))?;
            if loaded.documents.settings != config {
                tracing::warn!(
                    "stored index settings differ from the requested configuration; keeping stored settings"
                );
            }
            loaded
        } else {
            EngineData::new(config.clone())?
        };

        let wal = with_retry("wal open", || SyncWriteAheadLog::new(dir))?;
        let (entries, stats) = with_retry("wal replay", || wal.replay())?;
        if stats.decoded > 0 || stats.truncated || stats.crc_failures > 0 {
            tracing::info!(
                "replayed {} WAL entries ({} skipped, {} CRC failures, truncated: {})",
                stats.decoded,
                stats.skipped,
                stats.crc_failures,
                stats.truncated
            );
        }
        for entry in entries {
            apply_entry(&mut data, entry);
        }

        let pool = build_pool(&config)?;
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            wal: Some(Arc::new(wal)),
            data_dir: Some(dir.to_path_buf()),
            pool,
        })
    }

    fn run<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn journal(&self, entry: &WalEntry) -> Result<(), EngineError> {
        match &self.wal {
            Some(wal) => with_retry("wal append", || wal.append(entry)),
            None => Ok(()),
        }
    }

    /// Ingest document rows, indexing the named fields. Duplicate keys are
    /// skipped (delete + reinsert to update); malformed rows fail
    /// individually without aborting the batch.
    pub fn upload_documents(
        &self,
        rows: Vec<Row>,
        fields: &[&str],
    ) -> Result<UploadReport, EngineError> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.journal(&WalEntry::UploadDocuments {
            rows: rows.clone(),
            fields: fields.clone(),
        })?;

        let mut data = self.data.write();
        let data = &mut *data;
        let report = self.run(|| data.documents.ingest(rows, &fields));
        tracing::info!(
            "uploaded documents: {} inserted, {} skipped, {} failed ({} live)",
            report.inserted,
            report.skipped,
            report.failed,
            data.documents.docs.len()
        );
        Ok(report)
    }

    /// Ingest stored queries and document↔query edges for the graph path.
    pub fn upload_queries(
        &self,
        queries: Vec<String>,
        edges: Vec<EdgeRecord>,
    ) -> Result<UploadReport, EngineError> {
        self.journal(&WalEntry::UploadQueries {
            queries: queries.clone(),
            edges: edges.clone(),
        })?;

        let mut data = self.data.write();
        let data = &mut *data;
        let report = self.run(|| data.upload_queries(queries, edges));
        tracing::info!(
            "uploaded queries: {} inserted, {} skipped, {} edges ({} stored)",
            report.inserted,
            report.skipped,
            report.edges,
            data.queries.docs.len()
        );
        Ok(report)
    }

    /// Delete documents by external key; unknown keys are a no-op. Returns
    /// the number of documents removed.
    pub fn delete_documents(&self, keys: &[String]) -> Result<usize, EngineError> {
        self.journal(&WalEntry::DeleteDocuments {
            keys: keys.to_vec(),
        })?;

        let mut data = self.data.write();
        let data = &mut *data;
        let removed = self.run(|| data.documents.delete(keys));
        if removed > 0 {
            tracing::info!(
                "deleted {} documents ({} live)",
                removed,
                data.documents.docs.len()
            );
        }
        Ok(removed)
    }

    /// Replace a schema's stopword set and re-tokenise its corpus.
    pub fn set_stopwords(
        &self,
        schema: SchemaKind,
        stopwords: Vec<String>,
    ) -> Result<(), EngineError> {
        self.journal(&WalEntry::SetStopwords {
            schema,
            stopwords: stopwords.clone(),
        })?;

        let mut data = self.data.write();
        let data = &mut *data;
        self.run(|| match schema {
            SchemaKind::Documents => data.documents.set_stopwords(stopwords),
            SchemaKind::Queries => data.queries.set_stopwords(stopwords),
        })
    }

    /// Rank documents for a batch of queries. Sibling queries are
    /// independent; one query's failure to match anything never affects the
    /// others.
    pub fn search_documents(&self, queries: &[String], opts: &SearchOptions) -> Vec<QueryResult> {
        let deadline = opts.deadline.map(|d| Instant::now() + d);
        let data = self.data.read();
        let data = &*data;
        self.run(|| executor::execute_batch(&data.documents, queries, opts, deadline))
    }

    /// Rank stored queries for a batch of queries; identical algorithm to
    /// [`search_documents`](Self::search_documents) against the query schema.
    pub fn search_queries(&self, queries: &[String], opts: &SearchOptions) -> Vec<QueryResult> {
        let deadline = opts.deadline.map(|d| Instant::now() + d);
        let data = self.data.read();
        let data = &*data;
        self.run(|| executor::execute_batch(&data.queries, queries, opts, deadline))
    }

    /// Graph-augmented ranking: BM25 over documents and stored queries,
    /// recombined through the edge store.
    pub fn search_graphs(&self, queries: &[String], opts: &GraphOptions) -> Vec<QueryResult> {
        let deadline = opts.deadline.map(|d| Instant::now() + d);
        let data = self.data.read();
        let data = &*data;
        self.run(|| graph::execute_batch(data, queries, opts, deadline))
    }

    /// Write a snapshot and truncate the WAL. No-op for in-memory engines.
    pub fn save(&self) -> Result<(), EngineError> {
        let (Some(wal), Some(dir)) = (&self.wal, &self.data_dir) else {
            return Ok(());
        };
        let _gate = wal.freeze();
        let data = self.data.read();
        with_retry("snapshot save", || persistence::save_engine(&data, dir))?;
        with_retry("wal truncate", || wal.truncate())
    }

    /// Check every structural invariant of the engine state.
    pub fn validate(&self) -> Result<(), String> {
        self.data.read().validate()
    }

    /// Live document count.
    pub fn document_count(&self) -> usize {
        self.data.read().documents.docs.len()
    }

    /// Stored query count.
    pub fn query_count(&self) -> usize {
        self.data.read().queries.docs.len()
    }

    /// Edge count.
    pub fn edge_count(&self) -> usize {
        self.data.read().edges.len()
    }
}

fn build_pool(config: &IndexConfig) -> Result<Option<Arc<rayon::ThreadPool>>, EngineError> {
    if config.n_jobs > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_jobs as usize)
            .build()
            .map_err(|e| EngineError::InvalidInput(format!("cannot build worker pool: {e}")))?;
        Ok(Some(Arc::new(pool)))
    } else {
        // Non-positive means the shared global pool (all cores).
        Ok(None)
    }
}

fn apply_entry(data: &mut EngineData, entry: WalEntry) {
    match entry {
        WalEntry::UploadDocuments { rows, fields } => {
            data.documents.ingest(rows, &fields);
        }
        WalEntry::UploadQueries { queries, edges } => {
            data.upload_queries(queries, edges);
        }
        WalEntry::DeleteDocuments { keys } => {
            data.documents.delete(&keys);
        }
        WalEntry::SetStopwords { schema, stopwords } => {
            let result = match schema {
                SchemaKind::Documents => data.documents.set_stopwords(stopwords),
                SchemaKind::Queries => data.queries.set_stopwords(stopwords),
            };
            if let Err(e) = result {
                tracing::warn!("skipping invalid stopword entry during replay: {e}");
            }
        }
    }
}
