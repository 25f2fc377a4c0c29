//! Query rewriting collaborators used for expansion and reformulation

use super::filters::extract_year_range;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Rewrite backend unavailable: {0}")]
    Unavailable(String),

    #[error("Rewrite produced unusable output: {0}")]
    InvalidOutput(String),
}

/// Text-to-text rewriting used by multi-query expansion and reformulation
///
/// Implementations may call a language model; both operations are allowed
/// to fail and callers degrade to the unchanged query.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// Produce up to `n` alternative phrasings of the same question
    async fn generate_variants(&self, text: &str, n: usize) -> Result<Vec<String>, RewriteError>;

    /// Produce a broader version of the query
    async fn broaden(&self, text: &str) -> Result<String, RewriteError>;
}

/// Rewriter that never changes anything
#[derive(Debug, Clone, Default)]
pub struct IdentityRewriter;

#[async_trait]
impl QueryRewriter for IdentityRewriter {
    async fn generate_variants(&self, _text: &str, _n: usize) -> Result<Vec<String>, RewriteError> {
        Ok(Vec::new())
    }

    async fn broaden(&self, text: &str) -> Result<String, RewriteError> {
        Ok(text.to_string())
    }
}

/// Question words and fillers that carry no retrieval signal
const QUESTION_WORDS: &[&str] = &[
    "milloin", "mitä", "mikä", "mitkä", "miten", "miksi", "missä", "voiko", "voidaan", "onko",
    "oliko", "pitää", "täytyy", "kuuluu", "mukaan", "että", "kun", "jos", "tai", "sekä", "ja",
    "on", "ovat", "what", "when", "which", "how", "does", "the", "is", "are", "of", "and", "när",
    "vad", "hur", "och", "är", "att",
];

fn year_expression() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:from|between|vuo\w*|in)?\s*\d{4}(?:\s*(?:[-–]|to|and|ja)\s*\d{4})?\b")
            .expect("year expression pattern is valid")
    })
}

/// Deterministic, offline rewriter
///
/// Variants are the keyword form of the question. Broadening strips years
/// and question words and then drops the shortest remaining term, so
/// repeated broadening converges on a single term.
#[derive(Debug, Clone, Default)]
pub struct HeuristicRewriter;

impl HeuristicRewriter {
    pub fn new() -> Self {
        Self
    }

    fn content_terms(text: &str) -> Vec<String> {
        let without_years = if extract_year_range(text).is_some() {
            year_expression().replace_all(text, " ").into_owned()
        } else {
            text.to_string()
        };

        without_years
            .split(|c: char| !(c.is_alphanumeric() || c == ':' || c == '§'))
            .map(|w| w.trim_matches(':'))
            .filter(|w| !w.is_empty())
            .filter(|w| !QUESTION_WORDS.contains(&w.to_lowercase().as_str()))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl QueryRewriter for HeuristicRewriter {
    async fn generate_variants(&self, text: &str, n: usize) -> Result<Vec<String>, RewriteError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let keywords = Self::content_terms(text).join(" ");
        if keywords.is_empty() || keywords == text {
            return Ok(Vec::new());
        }
        Ok(vec![keywords])
    }

    async fn broaden(&self, text: &str) -> Result<String, RewriteError> {
        let mut terms = Self::content_terms(text);
        if terms.is_empty() {
            return Err(RewriteError::InvalidOutput(format!(
                "No content terms left in '{}'",
                text
            )));
        }

        if terms.len() > 1 {
            // Shortest term goes first; on ties the later one is dropped
            let shortest = terms
                .iter()
                .enumerate()
                .min_by_key(|(i, t)| (t.chars().count(), std::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            if let Some(drop_at) = shortest {
                terms.remove(drop_at);
            }
        }

        Ok(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_rewriter() {
        let rewriter = IdentityRewriter;
        assert!(rewriter.generate_variants("petos", 2).await.unwrap().is_empty());
        assert_eq!(rewriter.broaden("petos").await.unwrap(), "petos");
    }

    #[tokio::test]
    async fn test_variants_strip_question_words() {
        let rewriter = HeuristicRewriter::new();
        let variants = rewriter
            .generate_variants("Milloin yhtiökokous voidaan määrätä pidettäväksi?", 2)
            .await
            .unwrap();
        assert_eq!(variants, vec!["yhtiökokous määrätä pidettäväksi"]);
    }

    #[tokio::test]
    async fn test_variants_empty_when_nothing_changes() {
        let rewriter = HeuristicRewriter::new();
        assert!(rewriter
            .generate_variants("petos rangaistus", 2)
            .await
            .unwrap()
            .is_empty());
        assert!(rewriter.generate_variants("milloin", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broaden_drops_years_and_shortest_term() {
        let rewriter = HeuristicRewriter::new();
        let broader = rewriter
            .broaden("törkeä petos rangaistus 2015-2020")
            .await
            .unwrap();
        assert_eq!(broader, "törkeä rangaistus");
    }

    #[tokio::test]
    async fn test_broaden_converges_on_single_term() {
        let rewriter = HeuristicRewriter::new();
        let mut text = "vahingonkorvaus työnantajan vastuu".to_string();
        for _ in 0..5 {
            text = rewriter.broaden(&text).await.unwrap();
        }
        assert_eq!(text, "vahingonkorvaus");
    }

    #[tokio::test]
    async fn test_broaden_fails_without_content() {
        let rewriter = HeuristicRewriter::new();
        assert!(rewriter.broaden("milloin?").await.is_err());
    }
}
