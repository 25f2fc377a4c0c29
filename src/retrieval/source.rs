//! Candidate source adapters over the backing search primitives

use super::prefix::{query_prefixes, PrefixStrategy};
use super::ScoredItem;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexError, TextStore, VectorStore};
use crate::query::{extract_case_ids, FilterSet};
use ahash::AHashSet;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Candidate source kinds, in source-priority order
///
/// Fusion keeps the payload of the first list an id appears in, so lists
/// are fed to it sorted by this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CaseLookup,
    Vector,
    Lexical,
    Metadata,
    Prefix,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CaseLookup => "case_lookup",
            SourceKind::Vector => "vector",
            SourceKind::Lexical => "lexical",
            SourceKind::Metadata => "metadata",
            SourceKind::Prefix => "prefix",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    /// The source's backing store is unreachable
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// One candidate-generating search primitive
///
/// Sources hold no mutable state across calls. Ordinary failures are
/// absorbed into an empty list; only a total backing-store outage comes back
/// as [`SourceError::Unavailable`].
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether a search for `query_text` would reach the backing store;
    /// the pipeline skips sources that do not apply
    fn applies_to(&self, _query_text: &str) -> bool {
        true
    }

    /// Items ordered by the source's own score, at most `limit` of them
    async fn search(
        &self,
        query_text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, SourceError>;
}

/// Map a backing-store result onto the adapter failure policy
fn absorb(
    kind: SourceKind,
    result: Result<Vec<ScoredItem>, IndexError>,
    limit: usize,
) -> Result<Vec<ScoredItem>, SourceError> {
    match result {
        Ok(mut items) => {
            items.truncate(limit);
            Ok(items)
        }
        Err(IndexError::Unavailable(reason)) => Err(SourceError::Unavailable(reason)),
        Err(e) => {
            tracing::warn!("{} search failed, treating as empty: {}", kind, e);
            Ok(Vec::new())
        }
    }
}

fn non_word() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s]").expect("non-word pattern is valid"))
}

/// Strip characters the full-text engine could read as query syntax
pub fn sanitize_text_query(text: &str) -> String {
    non_word()
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Semantic search over chunk embeddings with a hard similarity floor
pub struct VectorSource {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    match_threshold: f32,
}

impl VectorSource {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        match_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            match_threshold,
        }
    }
}

#[async_trait]
impl CandidateSource for VectorSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Vector
    }

    async fn search(
        &self,
        query_text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, SourceError> {
        let embedding = match self.embedder.embed_query(query_text) {
            Ok(embedding) => embedding,
            Err(EmbeddingError::InitializationError(reason)) => {
                return Err(SourceError::Unavailable(reason));
            }
            Err(e) => {
                tracing::warn!("Query embedding failed, vector search skipped: {}", e);
                return Ok(Vec::new());
            }
        };

        let result = self
            .store
            .nearest(&embedding, self.match_threshold, limit, filters)
            .await;
        let mut items = absorb(self.kind(), result, limit)?;

        // Items at or below the floor are excluded, whatever the store did
        items.retain(|item| item.score > self.match_threshold);
        Ok(items)
    }
}

/// OR-of-terms full-text search over section bodies
pub struct LexicalSource {
    store: Arc<dyn TextStore>,
}

impl LexicalSource {
    pub fn new(store: Arc<dyn TextStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CandidateSource for LexicalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Lexical
    }

    fn applies_to(&self, query_text: &str) -> bool {
        !sanitize_text_query(query_text).is_empty()
    }

    async fn search(
        &self,
        query_text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, SourceError> {
        let text = sanitize_text_query(query_text);
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.store.rank_match(&text, limit, filters).await;
        absorb(self.kind(), result, limit)
    }
}

/// Full-text fallback on truncated term prefixes, for compound words
pub struct PrefixLexicalSource {
    store: Arc<dyn TextStore>,
    strategy: Arc<dyn PrefixStrategy>,
}

impl PrefixLexicalSource {
    pub fn new(store: Arc<dyn TextStore>, strategy: Arc<dyn PrefixStrategy>) -> Self {
        Self { store, strategy }
    }
}

#[async_trait]
impl CandidateSource for PrefixLexicalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Prefix
    }

    fn applies_to(&self, query_text: &str) -> bool {
        !query_prefixes(self.strategy.as_ref(), &sanitize_text_query(query_text)).is_empty()
    }

    async fn search(
        &self,
        query_text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, SourceError> {
        let prefixes = query_prefixes(self.strategy.as_ref(), &sanitize_text_query(query_text));
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("Prefix search terms: {:?}", prefixes);
        let result = self.store.prefix_match(&prefixes, limit, filters).await;
        absorb(self.kind(), result, limit)
    }
}

/// Full-text search over bibliographic fields, one hit per document
pub struct MetadataSource {
    store: Arc<dyn TextStore>,
}

impl MetadataSource {
    pub fn new(store: Arc<dyn TextStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CandidateSource for MetadataSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Metadata
    }

    fn applies_to(&self, query_text: &str) -> bool {
        !sanitize_text_query(query_text).is_empty()
    }

    async fn search(
        &self,
        query_text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, SourceError> {
        let text = sanitize_text_query(query_text);
        if text.is_empty() {
            return Ok(Vec::new());
        }

        // Fetch extra so that dropping repeats still fills the limit
        let result = self.store.rank_match(&text, limit.saturating_mul(3), filters).await;
        let items = absorb(self.kind(), result, limit.saturating_mul(3))?;

        let mut documents = AHashSet::new();
        let mut unique: Vec<ScoredItem> = items
            .into_iter()
            .filter(|item| documents.insert(item.document_id.clone()))
            .collect();
        unique.truncate(limit);
        Ok(unique)
    }
}

/// Direct lookup of every chunk of the cases a query names
pub struct CaseLookupSource {
    store: Arc<dyn TextStore>,
}

impl CaseLookupSource {
    pub fn new(store: Arc<dyn TextStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CandidateSource for CaseLookupSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CaseLookup
    }

    fn applies_to(&self, query_text: &str) -> bool {
        !extract_case_ids(query_text).is_empty()
    }

    async fn search(
        &self,
        query_text: &str,
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, SourceError> {
        let case_ids = extract_case_ids(query_text);
        let mut items = Vec::new();

        for case_id in &case_ids {
            if items.len() >= limit {
                break;
            }
            let remaining = limit - items.len();
            let result = self.store.chunks_for_case(case_id, remaining, filters).await;
            let found = absorb(self.kind(), result, remaining)?;
            tracing::debug!("Case lookup {}: {} chunks", case_id, found.len());

            items.extend(found.into_iter().map(|mut item| {
                item.score = 1.0;
                item
            }));
        }

        Ok(items)
    }
}
