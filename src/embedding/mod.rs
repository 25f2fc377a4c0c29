//! Embedding generation
//!
//! Architecture:
//! - EmbeddingProvider trait for abstraction
//! - FastEmbedProvider for local embedding (multilingual-e5-small, 384-dim)
//!
//! Vector and full-text indexes live in `crate::index`.

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

/// Default model: multilingual, handles Finnish and Swedish legal text
pub const DEFAULT_MODEL: &str = "multilingual-e5-small";
