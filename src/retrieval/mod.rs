//! Hybrid retrieval and rank fusion
//!
//! Fans a query and its expansions out to every candidate source, merges
//! the ranked lists with Reciprocal Rank Fusion, caps per-document
//! representation and retries with broader rewrites when too little comes
//! back.

pub mod diversity;
mod fusion;
mod item;
mod pipeline;
mod prefix;
mod reformulation;
mod run;
mod source;

pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
pub use item::{ChunkPayload, FusedCandidate, ScoredItem};
pub use pipeline::RetrievalPipeline;
pub use prefix::{query_prefixes, FractionalPrefixStrategy, PrefixStrategy};
pub use reformulation::{
    ReformulationController, ReformulationEvent, ReformulationState, Termination,
};
pub use run::{AttemptRecord, ListStatus, RetrievalRun, SourceList};
pub use source::{
    sanitize_text_query, CandidateSource, CaseLookupSource, LexicalSource, MetadataSource,
    PrefixLexicalSource, SourceError, SourceKind, VectorSource,
};

use thiserror::Error;

/// Errors that cross the retrieval boundary
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Malformed or oversized input; not retried
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// No source produced a list in this attempt
    #[error("Retrieval timed out: all {sources} source calls failed in attempt {attempt}")]
    RetrievalTimeout { attempt: u32, sources: usize },

    #[error("Invalid retrieval configuration: {0}")]
    Configuration(String),
}
