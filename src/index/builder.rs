//! Index builder: embeds corpus sections and fills the backing indexes

use super::{CorpusDocument, IndexError, TextIndex, TextIndexKind, VectorIndex};
use crate::config::IndexingConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters from one build
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub documents: usize,
    pub sections: usize,
    /// Sections embedded during the build
    pub embedded: usize,
    /// Sections that came with an embedding
    pub precomputed: usize,
    /// Sections left out of the vector index
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Everything a retrieval pipeline needs from one corpus
pub struct IndexedCorpus {
    pub sections: Arc<TextIndex>,
    pub metadata: Arc<TextIndex>,
    pub vectors: Arc<VectorIndex>,
    pub stats: IndexStats,
}

/// A section waiting for its embedding
struct PendingSection<'a> {
    document: &'a CorpusDocument,
    position: usize,
}

/// Builds in-memory indexes from a corpus
///
/// Sections without a precomputed embedding are embedded in batches of
/// `batch_size`. A failed batch is logged and its sections stay searchable
/// by text only.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    indexing: IndexingConfig,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        indexing: IndexingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            indexing,
            batch_size: batch_size.max(1),
        }
    }

    pub fn build(&self, documents: &[CorpusDocument]) -> Result<IndexedCorpus, IndexError> {
        let start = std::time::Instant::now();
        let section_count: usize = documents.iter().map(|d| d.sections.len()).sum();

        info!(
            "Indexing {} documents ({} sections)",
            documents.len(),
            section_count
        );

        let heap = self.indexing.writer_heap_bytes;
        let overfetch = self.indexing.overfetch;
        let sections = TextIndex::create_in_ram(TextIndexKind::Sections, heap, overfetch)?;
        let metadata = TextIndex::create_in_ram(TextIndexKind::Metadata, heap, overfetch)?;
        let vectors = VectorIndex::new(
            self.provider.dimension(),
            section_count,
            self.indexing.hnsw_m,
            self.indexing.hnsw_ef_construction,
            self.indexing.hnsw_ef_search,
            overfetch,
        )?;

        let mut stats = IndexStats {
            documents: documents.len(),
            sections: section_count,
            ..IndexStats::default()
        };
        let mut pending: Vec<PendingSection<'_>> = Vec::new();

        for document in documents {
            for (position, section) in document.sections.iter().enumerate() {
                let payload = document.payload(section, position);
                sections.add(&section.id, &document.document_id, &section.text, &payload)?;

                match &section.embedding {
                    Some(embedding) => match vectors.insert(
                        section.id.as_str(),
                        document.document_id.as_str(),
                        payload,
                        embedding,
                    ) {
                        Ok(()) => stats.precomputed += 1,
                        Err(e) => {
                            warn!("Skipping precomputed embedding of {}: {}", section.id, e);
                            stats.skipped += 1;
                        }
                    },
                    None => pending.push(PendingSection { document, position }),
                }
            }

            // Metadata hits point at the first section so they fuse with it
            if let Some(first) = document.sections.first() {
                metadata.add(
                    &first.id,
                    &document.document_id,
                    &document.metadata_text(),
                    &document.payload(first, 0),
                )?;
            }
        }

        for batch in pending.chunks(self.batch_size) {
            match self.embed_batch(batch) {
                Ok(embeddings) => {
                    for (item, embedding) in batch.iter().zip(embeddings.iter()) {
                        let section = &item.document.sections[item.position];
                        vectors.insert(
                            section.id.as_str(),
                            item.document.document_id.as_str(),
                            item.document.payload(section, item.position),
                            embedding,
                        )?;
                    }
                    stats.embedded += batch.len();
                    debug!("Embedded batch of {} sections", batch.len());
                }
                Err(e) => {
                    warn!("Failed to embed batch of {} sections: {}", batch.len(), e);
                    stats.skipped += batch.len();
                }
            }
        }

        sections.commit()?;
        metadata.commit()?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Indexing complete: {} embedded, {} precomputed, {} skipped, {}ms",
            stats.embedded, stats.precomputed, stats.skipped, stats.duration_ms
        );

        Ok(IndexedCorpus {
            sections: Arc::new(sections),
            metadata: Arc::new(metadata),
            vectors: Arc::new(vectors),
            stats,
        })
    }

    fn embed_batch(&self, batch: &[PendingSection<'_>]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let texts: Vec<String> = batch
            .iter()
            .map(|item| item.document.sections[item.position].text.clone())
            .collect();

        let embeddings = self.provider.embed_passages(&texts)?;

        if embeddings.len() != batch.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                batch.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::{CorpusSection, TextStore, VectorStore};
    use crate::query::FilterSet;

    /// Embeds by counting a few marker words; deterministic and offline
    struct KeywordEmbedder;

    impl EmbeddingProvider for KeywordEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let text = text.to_lowercase();
            let mut v: Vec<f32> = ["petos", "yhtiö", "vero"]
                .iter()
                .map(|w| text.matches(w).count() as f32)
                .collect();
            v.push(0.1);
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    fn document(id: &str, texts: &[&str]) -> CorpusDocument {
        CorpusDocument {
            document_id: id.to_string(),
            case_id: Some(format!("KKO:2020:{}", id)),
            title: format!("Ratkaisu {}", id),
            court: Some("KKO".to_string()),
            year: Some(2020),
            legal_domains: Vec::new(),
            url: None,
            tenant: None,
            holdings: vec!["Ratkaisun pääkohdat".to_string()],
            cited_laws: vec!["RL 36:1".to_string()],
            sections: texts
                .iter()
                .enumerate()
                .map(|(i, text)| CorpusSection {
                    id: format!("{}-{}", id, i),
                    section_type: None,
                    section_title: None,
                    text: text.to_string(),
                    embedding: None,
                })
                .collect(),
        }
    }

    fn builder() -> IndexBuilder {
        IndexBuilder::new(Arc::new(KeywordEmbedder), Config::default().indexing, 2)
    }

    #[tokio::test]
    async fn test_build_fills_all_indexes() {
        let documents = vec![
            document("1", &["Petos ja petoksen yritys.", "Rangaistus."]),
            document("2", &["Yhtiökokous."]),
        ];

        let corpus = builder().build(&documents).unwrap();
        assert_eq!(corpus.stats.documents, 2);
        assert_eq!(corpus.stats.sections, 3);
        assert_eq!(corpus.stats.embedded, 3);
        assert_eq!(corpus.sections.len(), 3);
        assert_eq!(corpus.metadata.len(), 2);
        assert_eq!(corpus.vectors.len(), 3);

        let hits = corpus
            .vectors
            .nearest(&[1.0, 0.0, 0.0, 0.1], 0.3, 5, &FilterSet::default())
            .await
            .unwrap();
        assert_eq!(hits[0].id, "1-0");

        let case = corpus
            .sections
            .chunks_for_case("KKO:2020:1", 10, &FilterSet::default())
            .await
            .unwrap();
        assert_eq!(case.len(), 2);
    }

    #[tokio::test]
    async fn test_metadata_points_at_first_section() {
        let corpus = builder()
            .build(&[document("7", &["Ensimmäinen.", "Toinen."])])
            .unwrap();
        let hits = corpus
            .metadata
            .rank_match("RL 36 1", 5, &FilterSet::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "7-0");
    }

    #[test]
    fn test_bad_precomputed_embedding_skipped() {
        let mut doc = document("3", &["Vero."]);
        doc.sections[0].embedding = Some(vec![1.0, 2.0]);

        let corpus = builder().build(&[doc]).unwrap();
        assert_eq!(corpus.stats.skipped, 1);
        assert!(corpus.vectors.is_empty());
        assert_eq!(corpus.sections.len(), 1);
    }
}
