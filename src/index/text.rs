//! Tantivy full-text index with Finnish stemming

use super::{IndexError, TextStore};
use crate::query::FilterSet;
use crate::retrieval::{ChunkPayload, ScoredItem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, RegexQuery, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

const FINNISH_TOKENIZER: &str = "fi_stem";

/// What the documents of a text index represent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextIndexKind {
    /// Section bodies
    Sections,
    /// One bibliographic entry per document
    Metadata,
}

/// Stored form of an indexed entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    document_id: String,
    payload: ChunkPayload,
}

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    case_id: Field,
    body: Field,
    body_raw: Field,
    record: Field,
}

/// Tantivy text index wrapper
///
/// `body` is stemmed for ranked OR matching; `body_raw` keeps whole
/// lower-cased words for prefix matching. Results are post-filtered with
/// [`FilterSet`], so `overfetch` times the limit is read from Tantivy.
pub struct TextIndex {
    kind: TextIndexKind,
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
    overfetch: usize,
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("case_id", STRING);

    let stemmed = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(FINNISH_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    schema_builder.add_text_field("body", stemmed);

    let raw = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqs),
    );
    schema_builder.add_text_field("body_raw", raw);

    schema_builder.add_text_field("record", STORED);

    schema_builder.build()
}

fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::Finnish))
        .build();
    index.tokenizers().register(FINNISH_TOKENIZER, analyzer);
}

fn field(schema: &Schema, name: &str) -> Result<Field, IndexError> {
    schema
        .get_field(name)
        .map_err(|_| IndexError::Initialization(format!("Missing '{}' field in schema", name)))
}

impl TextIndex {
    /// Create an in-memory index
    pub fn create_in_ram(
        kind: TextIndexKind,
        writer_heap_bytes: usize,
        overfetch: usize,
    ) -> Result<Self, IndexError> {
        let index = Index::create_in_ram(build_schema());
        Self::from_index(kind, index, writer_heap_bytes, overfetch)
    }

    /// Open the index stored in `path`, creating it when absent
    pub fn open_or_create(
        kind: TextIndexKind,
        path: &Path,
        writer_heap_bytes: usize,
        overfetch: usize,
    ) -> Result<Self, IndexError> {
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)
                .map_err(|e| IndexError::Initialization(e.to_string()))?
        } else {
            std::fs::create_dir_all(path)?;
            Index::create_in_dir(path, build_schema())
                .map_err(|e| IndexError::Initialization(e.to_string()))?
        };
        Self::from_index(kind, index, writer_heap_bytes, overfetch)
    }

    fn from_index(
        kind: TextIndexKind,
        index: Index,
        writer_heap_bytes: usize,
        overfetch: usize,
    ) -> Result<Self, IndexError> {
        register_tokenizers(&index);

        let schema = index.schema();
        let fields = Fields {
            id: field(&schema, "id")?,
            case_id: field(&schema, "case_id")?,
            body: field(&schema, "body")?,
            body_raw: field(&schema, "body_raw")?,
            record: field(&schema, "record")?,
        };

        let writer: IndexWriter = index
            .writer(writer_heap_bytes)
            .map_err(|e| IndexError::Initialization(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::Initialization(e.to_string()))?;

        Ok(Self {
            kind,
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            overfetch: overfetch.max(1),
        })
    }

    pub fn kind(&self) -> TextIndexKind {
        self.kind
    }

    /// Add one entry; visible to searches after [`TextIndex::commit`]
    pub fn add(
        &self,
        id: &str,
        document_id: &str,
        body: &str,
        payload: &ChunkPayload,
    ) -> Result<(), IndexError> {
        let record = StoredRecord {
            id: id.to_string(),
            document_id: document_id.to_string(),
            payload: payload.clone(),
        };
        let record = serde_json::to_string(&record)
            .map_err(|e| IndexError::Insert(format!("Cannot encode record {}: {}", id, e)))?;

        let mut document = doc!(
            self.fields.id => id,
            self.fields.body => body,
            self.fields.body_raw => body,
            self.fields.record => record,
        );
        if let Some(case_id) = &payload.case_id {
            document.add_text(self.fields.case_id, case_id.to_uppercase());
        }

        let writer = self.lock_writer()?;
        writer
            .add_document(document)
            .map_err(|e| IndexError::Insert(e.to_string()))?;
        Ok(())
    }

    /// Commit all pending changes and reload the reader
    pub fn commit(&self) -> Result<(), IndexError> {
        let mut writer = self.lock_writer()?;
        writer
            .commit()
            .map_err(|e| IndexError::Insert(e.to_string()))?;
        self.reader.reload()?;
        Ok(())
    }

    /// Get the number of committed entries
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>, IndexError> {
        self.writer
            .lock()
            .map_err(|_| IndexError::Unavailable("text index writer lock poisoned".to_string()))
    }

    /// Analyzed terms of `text` for the stemmed body field
    fn body_terms(&self, text: &str) -> Result<Vec<Term>, IndexError> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.body)?;
        let mut stream = analyzer.token_stream(text);

        let mut terms: Vec<Term> = Vec::new();
        while stream.advance() {
            let term = Term::from_field_text(self.fields.body, &stream.token().text);
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        Ok(terms)
    }

    /// Run a query, decode records, post-filter and order by (score, id)
    fn execute(
        &self,
        query: &dyn Query,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        let searcher = self.reader.searcher();
        let fetch = limit.saturating_mul(self.overfetch).max(1);

        let top_docs = searcher
            .search(query, &TopDocs::with_limit(fetch))
            .map_err(|e| IndexError::Query(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher.doc(address)?;
            let record = document
                .get_first(self.fields.record)
                .and_then(|v| v.as_str())
                .ok_or_else(|| IndexError::Query("Missing stored record".to_string()))?;
            let record: StoredRecord = serde_json::from_str(record)
                .map_err(|e| IndexError::Query(format!("Corrupt stored record: {}", e)))?;

            if filters.matches(&record.payload) {
                results.push(ScoredItem::new(
                    record.id,
                    record.document_id,
                    score,
                    record.payload,
                ));
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        results.truncate(limit);
        Ok(results)
    }

    /// OR-of-terms BM25 match on the stemmed body
    pub fn search(
        &self,
        text: &str,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        let terms = self.body_terms(text)?;
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();

        self.execute(&BooleanQuery::new(clauses), limit, filters)
    }

    /// Match words starting with any of `prefixes` on the unstemmed body
    ///
    /// Each matching prefix adds a constant to the score, so entries
    /// matching more prefixes rank first.
    pub fn search_prefixes(
        &self,
        prefixes: &[String],
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.to_lowercase();
            if prefix.is_empty() {
                continue;
            }
            let pattern = format!("{}.*", regex::escape(&prefix));
            let query = RegexQuery::from_pattern(&pattern, self.fields.body_raw)
                .map_err(|e| IndexError::Query(e.to_string()))?;
            clauses.push((Occur::Should, Box::new(query)));
        }

        if clauses.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        self.execute(&BooleanQuery::new(clauses), limit, filters)
    }

    /// Every entry of one case, in section order
    pub fn case_entries(
        &self,
        case_id: &str,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let term = Term::from_field_text(self.fields.case_id, &case_id.to_uppercase());
        let query = TermQuery::new(term, IndexRecordOption::Basic);

        // Every hit scores the same; read them all and order by position
        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as usize;
        let mut entries = self.execute(&query, total.max(1), filters)?;
        entries.sort_by(|a, b| {
            a.payload
                .position
                .cmp(&b.payload.position)
                .then_with(|| a.id.cmp(&b.id))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl TextStore for TextIndex {
    async fn rank_match(
        &self,
        text: &str,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        self.search(text, limit, filters)
    }

    async fn prefix_match(
        &self,
        prefixes: &[String],
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        self.search_prefixes(prefixes, limit, filters)
    }

    async fn chunks_for_case(
        &self,
        case_id: &str,
        limit: usize,
        filters: &FilterSet,
    ) -> Result<Vec<ScoredItem>, IndexError> {
        self.case_entries(case_id, limit, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payload(case_id: &str, position: usize) -> ChunkPayload {
        ChunkPayload {
            case_id: Some(case_id.to_string()),
            year: Some(2020),
            position,
            ..ChunkPayload::default()
        }
    }

    fn index() -> TextIndex {
        let index = TextIndex::create_in_ram(TextIndexKind::Sections, 15_000_000, 4).unwrap();
        index
            .add(
                "s1",
                "d1",
                "Vastaaja tuomittiin törkeästä petoksesta vankeuteen.",
                &payload("KKO:2020:1", 0),
            )
            .unwrap();
        index
            .add(
                "s2",
                "d1",
                "Oikeuspaikkasäännös ei ollut pakottava.",
                &payload("KKO:2020:1", 1),
            )
            .unwrap();
        index
            .add(
                "s3",
                "d2",
                "Yhtiökokous voidaan määrätä pidettäväksi.",
                &payload("KKO:2020:2", 0),
            )
            .unwrap();
        index.commit().unwrap();
        index
    }

    #[test]
    fn test_index_creation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sections");

        let created = TextIndex::open_or_create(TextIndexKind::Sections, &path, 15_000_000, 4);
        assert!(created.is_ok());
        drop(created);

        let reopened =
            TextIndex::open_or_create(TextIndexKind::Sections, &path, 15_000_000, 4).unwrap();
        assert!(reopened.is_empty());
        assert_eq!(reopened.kind(), TextIndexKind::Sections);
    }

    #[test]
    fn test_or_semantics() {
        let index = index();
        assert_eq!(index.len(), 3);

        // Only one of six terms occurs anywhere
        let results = index
            .search(
                "milloin yhtiökokous kutsutaan koolle ilman hallitusta",
                10,
                &FilterSet::default(),
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "s3");
    }

    #[test]
    fn test_query_terms_lowercased() {
        let index = index();
        let results = index.search("TÖRKEÄSTÄ", 10, &FilterSet::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "s1");
    }

    #[test]
    fn test_prefix_matching() {
        let index = index();
        let results = index
            .search_prefixes(&["oikeuspai".to_string()], 10, &FilterSet::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "s2");
    }

    #[test]
    fn test_case_entries_in_position_order() {
        let index = index();
        let results = index
            .case_entries("kko:2020:1", 10, &FilterSet::default())
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_filters_applied() {
        let index = index();
        let filters = FilterSet::default().with_years(Some(2021), None);
        assert!(index
            .search("yhtiökokous", 10, &filters)
            .unwrap()
            .is_empty());
    }
}
