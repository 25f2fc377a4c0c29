//! Index integration tests
//!
//! Builds the Tantivy and HNSW indexes from a small JSONL corpus and runs
//! the real candidate sources and pipeline over them. Embeddings come from
//! a keyword-count embedder so no model download is needed.

use lakihaku::config::Config;
use lakihaku::embedding::{EmbeddingError, EmbeddingProvider};
use lakihaku::index::{parse_corpus, IndexBuilder, IndexedCorpus};
use lakihaku::query::{FilterSet, HeuristicRewriter};
use lakihaku::retrieval::{
    CandidateSource, CaseLookupSource, FractionalPrefixStrategy, LexicalSource, MetadataSource,
    PrefixLexicalSource, RetrievalPipeline, VectorSource,
};
use std::collections::HashSet;
use std::sync::Arc;

const CORPUS: &str = r#"{"document_id":"kko-2018-5","case_id":"KKO:2018:5","title":"Törkeä petos","court":"KKO","year":2018,"legal_domains":["rikosoikeus"],"holdings":["Petoksen törkeysarvostelu"],"cited_laws":["RL 36:2"],"sections":[{"id":"kko-2018-5-0","section_type":"reasoning","text":"Törkeä petos. Vastaaja oli erehdyttänyt asianomistajaa ja aiheuttanut huomattavaa taloudellista vahinkoa."},{"id":"kko-2018-5-1","section_type":"sentencing","text":"Rangaistuksen mittaaminen."}]}
{"document_id":"kko-2012-3","case_id":"KKO:2012:3","title":"Petos ja kavallus","court":"KKO","year":2012,"legal_domains":["rikosoikeus"],"sections":[{"id":"kko-2012-3-0","text":"Petos ja kavallus. Syyte hylättiin."}]}

{"document_id":"kho-2020-1","case_id":"KHO:2020:1","title":"Rakennuslupa","court":"KHO","year":2020,"legal_domains":["hallinto-oikeus"],"sections":[{"id":"kho-2020-1-0","text":"Rakennuslupa ja oikeuspaikkasäännös."}]}
{"document_id":"kko-2019-9","case_id":"KKO:2019:9","title":"Yrityssaneeraus","court":"KKO","year":2019,"tenant":"firm-a","sections":[{"id":"kko-2019-9-0","text":"Petos yrityssaneerauksessa."}]}
"#;

/// Counts a few marker stems, plus a constant component
struct KeywordEmbedder;

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        let mut v: Vec<f32> = ["petos", "rakennuslupa", "rangaist"]
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

fn build() -> IndexedCorpus {
    let documents = parse_corpus(CORPUS.as_bytes()).unwrap();
    let config = Config::default();
    IndexBuilder::new(Arc::new(KeywordEmbedder), config.indexing, 2)
        .build(&documents)
        .unwrap()
}

fn ids(items: &[lakihaku::retrieval::ScoredItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

#[tokio::test]
async fn test_build_stats() {
    let corpus = build();
    assert_eq!(corpus.stats.documents, 4);
    assert_eq!(corpus.stats.sections, 5);
    assert_eq!(corpus.stats.embedded, 5);
    assert_eq!(corpus.stats.skipped, 0);
    assert_eq!(corpus.metadata.len(), 4);
}

#[tokio::test]
async fn test_lexical_matches_any_term() {
    let corpus = build();
    let source = LexicalSource::new(corpus.sections.clone());

    // No section contains every term; OR semantics still finds both topics
    let items = source
        .search("Törkeä petos, rakennuslupa ja vahingonkorvaus?", &FilterSet::new(), 10)
        .await
        .unwrap();
    let found: HashSet<&str> = ids(&items).into_iter().collect();

    assert!(found.contains("kko-2018-5-0"));
    assert!(found.contains("kho-2020-1-0"));
    // Tenant-owned content stays hidden without a tenant scope
    assert!(!found.contains("kko-2019-9-0"));
}

#[tokio::test]
async fn test_prefix_source_matches_compounds() {
    let corpus = build();
    let source = PrefixLexicalSource::new(
        corpus.sections.clone(),
        Arc::new(FractionalPrefixStrategy::default()),
    );

    let items = source
        .search("oikeuspaikkasäännöistä", &FilterSet::new(), 10)
        .await
        .unwrap();
    assert_eq!(ids(&items), vec!["kho-2020-1-0"]);
}

#[tokio::test]
async fn test_metadata_one_hit_per_document() {
    let corpus = build();
    let source = MetadataSource::new(corpus.metadata.clone());

    let items = source.search("KKO petos", &FilterSet::new(), 10).await.unwrap();
    assert!(!items.is_empty());

    let documents: HashSet<&str> = items.iter().map(|i| i.document_id.as_str()).collect();
    assert_eq!(documents.len(), items.len());
    assert!(items.iter().all(|i| i.id.ends_with("-0")));
}

#[tokio::test]
async fn test_case_lookup_returns_sections_in_order() {
    let corpus = build();
    let source = CaseLookupSource::new(corpus.sections.clone());

    let items = source
        .search("Mitä KKO:2018:5 linjasi?", &FilterSet::new(), 30)
        .await
        .unwrap();
    assert_eq!(ids(&items), vec!["kko-2018-5-0", "kko-2018-5-1"]);
    assert!(items.iter().all(|i| i.score == 1.0));

    let none = source.search("petos", &FilterSet::new(), 30).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_filters_apply_in_every_store() {
    let corpus = build();
    let lexical = LexicalSource::new(corpus.sections.clone());

    let years = FilterSet::new().with_years(Some(2015), Some(2020));
    let items = lexical.search("petos", &years, 10).await.unwrap();
    assert_eq!(ids(&items), vec!["kko-2018-5-0"]);

    let tenant = years.clone().with_tenant("firm-a");
    let items = lexical.search("petos", &tenant, 10).await.unwrap();
    let found: HashSet<&str> = ids(&items).into_iter().collect();
    assert_eq!(found, HashSet::from(["kko-2018-5-0", "kko-2019-9-0"]));

    let court = FilterSet::new().with_court("kho");
    let items = lexical.search("rakennuslupa petos", &court, 10).await.unwrap();
    assert_eq!(ids(&items), vec!["kho-2020-1-0"]);
}

#[tokio::test]
async fn test_vector_source_respects_floor() {
    let corpus = build();
    let source = VectorSource::new(Arc::new(KeywordEmbedder), corpus.vectors.clone(), 0.3);

    let items = source.search("petos", &FilterSet::new(), 10).await.unwrap();
    let found: HashSet<&str> = ids(&items).into_iter().collect();

    assert_eq!(found, HashSet::from(["kko-2018-5-0", "kko-2012-3-0"]));
    assert!(items.iter().all(|i| i.score > 0.3 && i.score <= 1.0));
}

#[tokio::test]
async fn test_full_pipeline_over_indexes() {
    let corpus = build();
    let config = Config::default().retrieval;

    let strategy = Arc::new(FractionalPrefixStrategy::new(
        config.prefix_fractions.clone(),
        config.prefix_min_term_chars,
    ));
    let sources: Vec<Arc<dyn CandidateSource>> = vec![
        Arc::new(VectorSource::new(
            Arc::new(KeywordEmbedder),
            corpus.vectors.clone(),
            config.match_threshold,
        )),
        Arc::new(LexicalSource::new(corpus.sections.clone())),
        Arc::new(PrefixLexicalSource::new(corpus.sections.clone(), strategy)),
        Arc::new(MetadataSource::new(corpus.metadata.clone())),
        Arc::new(CaseLookupSource::new(corpus.sections.clone())),
    ];

    let pipeline =
        RetrievalPipeline::new(sources, Arc::new(HeuristicRewriter::new()), config).unwrap();
    let filters = FilterSet::new().with_years_from_text("petos 2015-2020");
    let run = pipeline.retrieve_text("petos 2015-2020", &filters).await.unwrap();

    assert!(!run.candidates.is_empty());
    assert_eq!(run.candidates[0].id, "kko-2018-5-0");
    assert!(run
        .candidates
        .iter()
        .all(|c| matches!(c.payload.year, Some(y) if (2015..=2020).contains(&y))));
    assert!(run.degraded_sources.is_empty());
}
