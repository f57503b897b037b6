//! Text normalisation pipeline shared by documents and queries.
//!
//! A [`Tokenizer`] applies, in order: lowercasing, accent stripping (NFKD,
//! combining marks dropped), ignore-pattern blanking, whitespace splitting,
//! stopword removal, and stemming. The same tokenizer instance is used for
//! indexing and querying, so a query term always normalises to the same
//! surface form as the document term it should match.

use crate::config::IndexConfig;
use crate::error::EngineError;
use regex::Regex;
use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Default English stopword list, used when the configuration names the
/// `english` language instead of supplying an explicit list.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "me", "more", "most", "my", "myself", "no", "nor", "not", "of", "off", "on",
    "once", "only", "or", "other", "ought", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
    "yourself", "yourselves",
];

/// Stemming algorithm. `Porter` is an alias for the English Snowball stemmer;
/// the remaining variants map one-to-one onto [`rust_stemmers::Algorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stemmer {
    None,
    #[default]
    Porter,
    Arabic,
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Greek,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

impl Stemmer {
    fn algorithm(self) -> Option<Algorithm> {
        match self {
            Stemmer::None => None,
            Stemmer::Porter | Stemmer::English => Some(Algorithm::English),
            Stemmer::Arabic => Some(Algorithm::Arabic),
            Stemmer::Danish => Some(Algorithm::Danish),
            Stemmer::Dutch => Some(Algorithm::Dutch),
            Stemmer::Finnish => Some(Algorithm::Finnish),
            Stemmer::French => Some(Algorithm::French),
            Stemmer::German => Some(Algorithm::German),
            Stemmer::Greek => Some(Algorithm::Greek),
            Stemmer::Hungarian => Some(Algorithm::Hungarian),
            Stemmer::Italian => Some(Algorithm::Italian),
            Stemmer::Norwegian => Some(Algorithm::Norwegian),
            Stemmer::Portuguese => Some(Algorithm::Portuguese),
            Stemmer::Romanian => Some(Algorithm::Romanian),
            Stemmer::Russian => Some(Algorithm::Russian),
            Stemmer::Spanish => Some(Algorithm::Spanish),
            Stemmer::Swedish => Some(Algorithm::Swedish),
            Stemmer::Tamil => Some(Algorithm::Tamil),
            Stemmer::Turkish => Some(Algorithm::Turkish),
        }
    }
}

/// Stopword source: a named language list or an explicit set of surfaces.
///
/// Uses the default externally-tagged serde representation for bincode
/// compatibility (settings are persisted inside snapshots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stopwords {
    /// Named built-in list (currently only `english`).
    Language(String),
    /// Explicit surface forms, matched after splitting and before stemming.
    List(Vec<String>),
}

impl Default for Stopwords {
    fn default() -> Self {
        Stopwords::Language("english".to_string())
    }
}

impl Stopwords {
    /// Resolve to the concrete surface set.
    pub fn surfaces(&self) -> Result<HashSet<String>, EngineError> {
        match self {
            Stopwords::Language(lang) => match lang.as_str() {
                "english" => Ok(ENGLISH_STOPWORDS.iter().map(|s| s.to_string()).collect()),
                other => Err(EngineError::InvalidInput(format!(
                    "unknown stopword language '{other}'"
                ))),
            },
            Stopwords::List(words) => Ok(words.iter().cloned().collect()),
        }
    }
}

/// Compiled tokenizer. Construction validates the ignore pattern; tokenising
/// itself is pure and infallible.
pub struct Tokenizer {
    lower: bool,
    strip_accents: bool,
    ignore: Option<Regex>,
    stopwords: HashSet<String>,
    stemmer: Option<rust_stemmers::Stemmer>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("lower", &self.lower)
            .field("strip_accents", &self.strip_accents)
            .field("ignore", &self.ignore.as_ref().map(|re| re.as_str()))
            .field("stopwords", &self.stopwords.len())
            .field("stemmer", &self.stemmer.is_some())
            .finish()
    }
}

impl Default for Tokenizer {
    /// Pass-through tokenizer (whitespace split only). Placeholder state for
    /// deserialized index data; replaced via [`Tokenizer::new`] before use.
    fn default() -> Self {
        Self {
            lower: false,
            strip_accents: false,
            ignore: None,
            stopwords: HashSet::new(),
            stemmer: None,
        }
    }
}

impl Tokenizer {
    /// Build a tokenizer from index settings. Fails with `InvalidInput` if
    /// the ignore pattern does not compile or the stopword language is
    /// unknown.
    pub fn new(config: &IndexConfig) -> Result<Self, EngineError> {
        let ignore = if config.ignore.is_empty() {
            None
        } else {
            Some(Regex::new(&config.ignore).map_err(|e| {
                EngineError::InvalidInput(format!("malformed ignore pattern: {e}"))
            })?)
        };
        Ok(Self {
            lower: config.lower,
            strip_accents: config.strip_accents,
            ignore,
            stopwords: config.stopwords.surfaces()?,
            stemmer: config.stemmer.algorithm().map(rust_stemmers::Stemmer::create),
        })
    }

    /// Replace the stopword set, leaving every other option untouched.
    pub fn set_stopwords(&mut self, stopwords: HashSet<String>) {
        self.stopwords = stopwords;
    }

    /// Normalise `text` into an ordered term sequence. Empty output is valid.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.strip_accents {
            text = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
        }
        let cleaned = match &self.ignore {
            Some(re) => re.replace_all(&text, " "),
            None => std::borrow::Cow::Borrowed(text.as_str()),
        };
        cleaned
            .split_whitespace()
            .filter(|t| !self.stopwords.contains(*t))
            .map(|t| match &self.stemmer {
                Some(s) => s.stem(t).into_owned(),
                None => t.to_string(),
            })
            .collect()
    }
}
