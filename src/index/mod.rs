//! Backing search primitives
//!
//! The retrieval core only sees the [`VectorStore`] and [`TextStore`]
//! traits. This module also ships local implementations: an HNSW cosine
//! index and a Tantivy full-text index with Finnish stemming, plus the
//! corpus model and [`IndexBuilder`] that fills them.

mod builder;
mod corpus;
mod text;
mod vector;

pub use builder::{IndexBuilder, IndexStats, IndexedCorpus};
pub use corpus::{load_corpus, parse_corpus, CorpusDocument, CorpusSection};
pub use text::{TextIndex, TextIndexKind};
pub use vector::VectorIndex;

use crate::query::FilterSet;
use crate::retrieval::ScoredItem;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    /// The backing store cannot serve requests at all
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Index initialization failed: {0}")]
    Initialization(String),

    #[error("Insert failed: {0}")]
    Insert(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}

/// Nearest-neighbour primitive over chunk embeddings
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Items with cosine similarity above `floor`, most similar first.
    /// Scores are similarities in [0, 1].
    async fn nearest(
        &self,
        vector: &[f32],
        floor: f32,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError>;
}

/// Ranked full-text primitive
#[async_trait]
pub trait TextStore: Send + Sync {
    /// OR-of-terms ranked match, best first
    async fn rank_match(
        &self,
        text: &str,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError>;

    /// Ranked match where any indexed word starting with any prefix counts
    async fn prefix_match(
        &self,
        prefixes: &[String],
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError>;

    /// Every chunk of one case, in document order
    async fn chunks_for_case(
        &self,
        case_id: &str,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError>;
}
