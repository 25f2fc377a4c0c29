//! HNSW vector index for similarity search

use super::{IndexError, VectorStore};
use crate::query::FilterSet;
use crate::retrieval::{ChunkPayload, ScoredItem};
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use std::sync::RwLock;

/// What an HNSW slot points at
#[derive(Debug, Clone)]
struct Entry {
    id: String,
    document_id: String,
    payload: ChunkPayload,
}

/// HNSW vector index wrapper
///
/// Provides approximate nearest neighbour search with cosine similarity.
/// HNSW slot numbers index into `entries`, which holds ids and payloads.
pub struct VectorIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    entries: RwLock<Vec<Entry>>,
    dimension: usize,
    ef_search: usize,
    /// Neighbours fetched per requested result, to survive post-filtering
    overfetch: usize,
}

impl VectorIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `capacity` - Expected number of vectors
    /// * `m` - HNSW M parameter (number of connections per layer)
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `ef_search` - HNSW search parameter
    pub fn new(
        dimension: usize,
        capacity: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        overfetch: usize,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::Initialization(
                "Vector dimension must be greater than 0".to_string(),
            ));
        }

        let hnsw = Hnsw::<f32, DistCosine>::new(
            m,
            capacity.max(1),
            16, // max layers
            ef_construction,
            DistCosine {},
        );

        Ok(Self {
            hnsw,
            entries: RwLock::new(Vec::with_capacity(capacity)),
            dimension,
            ef_search,
            overfetch: overfetch.max(1),
        })
    }

    /// Insert one chunk embedding
    pub fn insert(
        &self,
        id: impl Into<String>,
        document_id: impl Into<String>,
        payload: ChunkPayload,
        vector: &[f32],
    ) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| IndexError::Unavailable("vector index lock poisoned".to_string()))?;

        let slot = entries.len();
        entries.push(Entry {
            id: id.into(),
            document_id: document_id.into(),
            payload,
        });
        self.hnsw.insert((vector, slot));

        Ok(())
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Nearest neighbours above `floor`, filtered, most similar first
    pub fn search(
        &self,
        query: &[f32],
        floor: f32,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let entries = self
            .entries
            .read()
            .map_err(|_| IndexError::Unavailable("vector index lock poisoned".to_string()))?;

        if entries.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let knbn = limit.saturating_mul(self.overfetch).min(entries.len());
        let neighbours = self.hnsw.search(query, knbn, self.ef_search.max(knbn));

        let mut results: Vec<ScoredItem> = neighbours
            .into_iter()
            .filter_map(|neighbour| {
                // Cosine distance is 1 - cos; similarity is kept in [0, 1]
                let similarity = (1.0 - neighbour.distance).clamp(0.0, 1.0);
                if similarity.is_nan() || similarity <= floor {
                    return None;
                }
                let entry = entries.get(neighbour.d_id)?;
                if !filters.matches(&entry.payload) {
                    return None;
                }
                Some(ScoredItem::new(
                    entry.id.clone(),
                    entry.document_id.clone(),
                    similarity,
                    entry.payload.clone(),
                ))
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        results.truncate(limit);

        Ok(results)
    }
}

#[async_trait]
impl VectorStore for VectorIndex {
    async fn nearest(
        &self,
        vector: &[f32],
        floor: f32,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        self.search(vector, floor, limit, filters)
    }
}
