//! Lakihaku - Hybrid retrieval for Finnish legal research
//!
//! Takes a legal question, fans it out over vector, full-text, metadata and
//! prefix search, merges the ranked lists with Reciprocal Rank Fusion, caps
//! how many chunks one case may contribute, and retries with a broader
//! query when too little is found. The resulting candidate list feeds an
//! external reranking and answer-generation stage.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod query;
pub mod retrieval;

pub use error::{LakihakuError, Result};
