//! End-to-end engine scenarios: ranking, deletion repair, length
//! normalisation, filtering, graph re-ranking, approximation boundaries,
//! and durability round-trips.

use okapisearch_core::{
    ColumnValue, EdgeRecord, FilterClause, FilterCondition, FilterOperator, GraphOptions,
    IndexConfig, OrderBy, Row, SchemaKind, SearchEngine, SearchOptions,
};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

fn text_rows(specs: &[(&str, &str)]) -> Vec<Row> {
    specs
        .iter()
        .map(|&(key, text)| Row::from_text(key, "text", text))
        .collect()
}

fn engine_with(specs: &[(&str, &str)]) -> SearchEngine {
    let engine = SearchEngine::new(IndexConfig::default()).unwrap();
    engine.upload_documents(text_rows(specs), &["text"]).unwrap();
    engine
}

fn keys(result: &okapisearch_core::QueryResult) -> Vec<&str> {
    result.hits.iter().map(|h| h.key.as_str()).collect()
}

#[test]
fn tiny_corpus_ranks_by_score_then_key_order() {
    let engine = engine_with(&[
        ("A", "the cat sat"),
        ("B", "the dog sat"),
        ("C", "cats and dogs"),
    ]);
    let opts = SearchOptions {
        top_k: 2,
        top_k_token: 10,
        ..SearchOptions::default()
    };
    let results = engine.search_documents(&["cat".to_string()], &opts);
    assert_eq!(results.len(), 1);
    // A and C tie on score; the earlier document id wins the tiebreak.
    assert_eq!(keys(&results[0]), vec!["A", "C"]);
    assert!(!results[0].partial);
    engine.validate().unwrap();
}

#[test]
fn delete_repairs_document_frequency() {
    let engine = engine_with(&[
        ("A", "the cat sat"),
        ("B", "the dog sat"),
        ("C", "cats and dogs"),
    ]);
    engine.delete_documents(&["A".to_string()]).unwrap();

    let results = engine.search_documents(&["cat".to_string()], &SearchOptions::default());
    assert_eq!(keys(&results[0]), vec!["C"]);
    assert_eq!(engine.document_count(), 2);
    engine.validate().unwrap();
}

#[test]
fn shorter_document_outranks_longer_at_equal_tf() {
    let long_text = "apple kiwi mango papaya guava lychee plum fig date melon \
                     grape peach pear cherry apricot banana coconut lime lemon orange \
                     nectarine quince persimmon pomelo tangerine durian rambutan starfruit soursop jackfruit";
    let engine = engine_with(&[("short", "apple kiwi mango"), ("long", long_text)]);
    let results = engine.search_documents(&["apple".to_string()], &SearchOptions::default());
    assert_eq!(results[0].hits.len(), 2);
    assert_eq!(results[0].hits[0].key, "short");
    assert!(results[0].hits[0].score > results[0].hits[1].score);
}

#[test]
fn filter_prunes_candidates() {
    let mut rows = Vec::new();
    for (key, text, year, popularity) in [
        ("woodstock", "rock classic anthem", 1969, 10),
        ("punk-era", "rock revolution single", 1977, 9),
        ("revival", "indie revival single", 2007, 9),
    ] {
        let mut columns = HashMap::new();
        columns.insert("text".to_string(), ColumnValue::String(text.to_string()));
        columns.insert("year".to_string(), ColumnValue::Integer(year));
        columns.insert(
            "popularity".to_string(),
            ColumnValue::Integer(popularity),
        );
        rows.push(Row::new(key, columns));
    }
    let engine = SearchEngine::new(IndexConfig::default()).unwrap();
    engine.upload_documents(rows, &["text"]).unwrap();

    let opts = SearchOptions {
        filter: Some(FilterClause::must(vec![
            FilterCondition::new("year", FilterOperator::Gte, json!(1970)),
            FilterCondition::new("popularity", FilterOperator::Gt, json!(8)),
        ])),
        ..SearchOptions::default()
    };
    let results = engine.search_documents(&["rock".to_string()], &opts);
    assert_eq!(keys(&results[0]), vec!["punk-era"]);
}

#[test]
fn order_by_overrides_score_ranking() {
    let mut rows = Vec::new();
    for (key, year) in [("a", 1991), ("b", 2003), ("c", 1977)] {
        let mut columns = HashMap::new();
        columns.insert(
            "text".to_string(),
            ColumnValue::String("rock ballad".to_string()),
        );
        columns.insert("year".to_string(), ColumnValue::Integer(year));
        rows.push(Row::new(key, columns));
    }
    let engine = SearchEngine::new(IndexConfig::default()).unwrap();
    engine.upload_documents(rows, &["text"]).unwrap();

    let opts = SearchOptions {
        order_by: Some(OrderBy {
            field: "year".to_string(),
            descending: true,
        }),
        ..SearchOptions::default()
    };
    let results = engine.search_documents(&["rock".to_string()], &opts);
    assert_eq!(keys(&results[0]), vec!["b", "a", "c"]);
}

#[test]
fn graph_rerank_reaches_edge_only_documents() {
    let engine = engine_with(&[("X", "alive")]);
    engine
        .upload_queries(
            vec!["daft punk".to_string()],
            vec![EdgeRecord::new("X", "daft punk")],
        )
        .unwrap();

    // BM25 alone cannot retrieve X for this query.
    let bm25 = engine.search_documents(&["daft punk".to_string()], &SearchOptions::default());
    assert!(bm25[0].hits.is_empty());

    // The graph path reaches X through the stored query and scores it
    // strictly above its (absent, zero) BM25 contribution.
    let graph = engine.search_graphs(&["daft punk".to_string()], &GraphOptions::default());
    assert_eq!(keys(&graph[0]), vec!["X"]);
    assert!(graph[0].hits[0].score > 0.0);
    engine.validate().unwrap();
}

#[test]
fn graph_rerank_boosts_direct_matches_with_edges() {
    let engine = engine_with(&[("X", "daft punk alive"), ("Y", "daft punk discovery")]);
    engine
        .upload_queries(
            vec!["daft punk".to_string()],
            vec![EdgeRecord::new("X", "daft punk")],
        )
        .unwrap();

    let bm25 = engine.search_documents(&["daft punk".to_string()], &SearchOptions::default());
    let bm25_x = bm25[0]
        .hits
        .iter()
        .find(|h| h.key == "X")
        .map(|h| h.score)
        .unwrap();

    let graph = engine.search_graphs(&["daft punk".to_string()], &GraphOptions::default());
    let graph_x = graph[0]
        .hits
        .iter()
        .find(|h| h.key == "X")
        .map(|h| h.score)
        .unwrap();
    assert!(graph_x > bm25_x);
    // The edge promotes X above the otherwise comparable Y.
    assert_eq!(graph[0].hits[0].key, "X");
}

#[test]
fn truncated_slices_bound_the_candidate_set() {
    // Doc "both" scores below the per-term leaders, so top-1 slices are
    // disjoint: alpha → "heavy-alpha", beta → "heavy-beta".
    let engine = engine_with(&[
        ("heavy-alpha", "alpha alpha alpha"),
        ("heavy-beta", "beta beta beta"),
        ("both", "alpha beta"),
    ]);
    let narrow = SearchOptions {
        top_k_token: 1,
        ..SearchOptions::default()
    };
    let results = engine.search_documents(&["alpha beta".to_string()], &narrow);
    let found = keys(&results[0]);
    assert_eq!(found.len(), 2);
    assert!(found.contains(&"heavy-alpha") && found.contains(&"heavy-beta"));
    assert!(!found.contains(&"both"));
}

#[test]
fn widening_top_k_token_never_removes_results() {
    let engine = engine_with(&[
        ("heavy-alpha", "alpha alpha alpha"),
        ("heavy-beta", "beta beta beta"),
        ("both", "alpha beta"),
    ]);
    let narrow = SearchOptions {
        top_k_token: 1,
        ..SearchOptions::default()
    };
    let wide = SearchOptions {
        top_k_token: 10_000,
        ..SearchOptions::default()
    };
    let narrow_keys: Vec<String> = engine.search_documents(&["alpha beta".to_string()], &narrow)
        [0]
    .hits
    .iter()
    .map(|h| h.key.clone())
    .collect();
    let wide_result = &engine.search_documents(&["alpha beta".to_string()], &wide)[0];
    let wide_keys = keys(wide_result);
    for key in &narrow_keys {
        assert!(wide_keys.contains(&key.as_str()));
    }
    // Exact retrieval surfaces the accumulated two-term document first.
    assert_eq!(wide_result.hits[0].key, "both");
}

#[test]
fn empty_corpus_returns_empty_results() {
    let engine = SearchEngine::new(IndexConfig::default()).unwrap();
    let results = engine.search_documents(&["anything".to_string()], &SearchOptions::default());
    assert_eq!(results.len(), 1);
    assert!(results[0].hits.is_empty());
    assert!(!results[0].partial);
}

#[test]
fn out_of_dictionary_query_is_empty() {
    let engine = engine_with(&[("a", "the cat sat")]);
    let results =
        engine.search_documents(&["zzyzx quux".to_string()], &SearchOptions::default());
    assert!(results[0].hits.is_empty());
}

#[test]
fn top_k_above_candidate_count_returns_all() {
    let engine = engine_with(&[("a", "cat"), ("b", "cat food")]);
    let opts = SearchOptions {
        top_k: 50,
        ..SearchOptions::default()
    };
    let results = engine.search_documents(&["cat".to_string()], &opts);
    assert_eq!(results[0].hits.len(), 2);
}

#[test]
fn sibling_queries_are_independent() {
    let engine = engine_with(&[("a", "the cat sat"), ("b", "the dog sat")]);
    let queries = vec![
        "cat".to_string(),
        "".to_string(),
        "dog".to_string(),
        "zzyzx".to_string(),
    ];
    let results = engine.search_documents(&queries, &SearchOptions::default());
    assert_eq!(results.len(), 4);
    assert_eq!(keys(&results[0]), vec!["a"]);
    assert!(results[1].hits.is_empty());
    assert_eq!(keys(&results[2]), vec!["b"]);
    assert!(results[3].hits.is_empty());
}

#[test]
fn expired_deadline_flags_partial_results() {
    let engine = engine_with(&[("a", "the cat sat")]);
    let opts = SearchOptions {
        deadline: Some(Duration::ZERO),
        ..SearchOptions::default()
    };
    let results = engine.search_documents(&["cat".to_string()], &opts);
    assert!(results[0].partial);
}

#[test]
fn delete_then_reinsert_restores_ranking() {
    let corpus = &[
        ("A", "the cat sat"),
        ("B", "the dog sat"),
        ("C", "cats and dogs"),
    ];
    let engine = engine_with(corpus);
    let before = engine.search_documents(&["cat sat".to_string()], &SearchOptions::default());

    let all_keys: Vec<String> = corpus.iter().map(|&(k, _)| k.to_string()).collect();
    engine.delete_documents(&all_keys).unwrap();
    assert_eq!(engine.document_count(), 0);
    engine.upload_documents(text_rows(corpus), &["text"]).unwrap();

    let after = engine.search_documents(&["cat sat".to_string()], &SearchOptions::default());
    assert_eq!(keys(&before[0]), keys(&after[0]));
    for (b, a) in before[0].hits.iter().zip(&after[0].hits) {
        assert!((b.score - a.score).abs() < 1e-6);
    }
    engine.validate().unwrap();
}

#[test]
fn stored_query_search_finds_exact_query() {
    let engine = SearchEngine::new(IndexConfig::default()).unwrap();
    engine
        .upload_queries(
            vec!["daft punk".to_string(), "rolling stones".to_string()],
            Vec::new(),
        )
        .unwrap();
    let results = engine.search_queries(&["daft punk".to_string()], &SearchOptions::default());
    assert_eq!(results[0].hits[0].key, "daft punk");
}

#[test]
fn configured_thread_pool_produces_same_results() {
    let config = IndexConfig {
        n_jobs: 2,
        batch_size: 2,
        ..IndexConfig::default()
    };
    let engine = SearchEngine::new(config).unwrap();
    engine
        .upload_documents(
            text_rows(&[
                ("A", "the cat sat"),
                ("B", "the dog sat"),
                ("C", "cats and dogs"),
                ("D", "dogs chasing cats"),
                ("E", "a quiet reading room"),
            ]),
            &["text"],
        )
        .unwrap();
    let results = engine.search_documents(&["cat".to_string()], &SearchOptions::default());
    assert_eq!(results[0].hits.len(), 3);
    engine.validate().unwrap();
}

#[test]
fn durable_engine_replays_wal_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = SearchEngine::open(dir.path(), IndexConfig::default()).unwrap();
        engine
            .upload_documents(text_rows(&[("a", "the cat sat"), ("b", "the dog sat")]), &["text"])
            .unwrap();
        engine.delete_documents(&["b".to_string()]).unwrap();
    }
    let engine = SearchEngine::open(dir.path(), IndexConfig::default()).unwrap();
    assert_eq!(engine.document_count(), 1);
    let results = engine.search_documents(&["cat".to_string()], &SearchOptions::default());
    assert_eq!(keys(&results[0]), vec!["a"]);
    engine.validate().unwrap();
}

#[test]
fn snapshot_save_then_reopen_preserves_graph_state() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = SearchEngine::open(dir.path(), IndexConfig::default()).unwrap();
        engine
            .upload_documents(text_rows(&[("X", "alive")]), &["text"])
            .unwrap();
        engine
            .upload_queries(
                vec!["daft punk".to_string()],
                vec![EdgeRecord::new("X", "daft punk")],
            )
            .unwrap();
        engine.save().unwrap();
    }
    let engine = SearchEngine::open(dir.path(), IndexConfig::default()).unwrap();
    assert_eq!(engine.query_count(), 1);
    assert_eq!(engine.edge_count(), 1);
    let graph = engine.search_graphs(&["daft punk".to_string()], &GraphOptions::default());
    assert_eq!(keys(&graph[0]), vec!["X"]);
    engine.validate().unwrap();
}

#[test]
fn stopword_update_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = SearchEngine::open(dir.path(), IndexConfig::default()).unwrap();
        engine
            .upload_documents(text_rows(&[("a", "larva turns moth")]), &["text"])
            .unwrap();
        engine
            .set_stopwords(SchemaKind::Documents, vec!["larva".to_string()])
            .unwrap();
    }
    let engine = SearchEngine::open(dir.path(), IndexConfig::default()).unwrap();
    let results = engine.search_documents(&["larva".to_string()], &SearchOptions::default());
    assert!(results[0].hits.is_empty());
    engine.validate().unwrap();
}
