//! Query normalization and validation

use super::{Language, Query, QueryOrigin};
use crate::retrieval::RetrievalError;

/// Validates raw user input and produces the canonical [`Query`]
///
/// Normalization trims the input and collapses whitespace runs; it never
/// stems or lowercases, leaving that to each source.
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    max_chars: usize,
}

impl QueryNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Normalize raw user input into a query
    pub fn normalize(&self, raw: &str) -> Result<Query, RetrievalError> {
        let text = self.canonical_text(raw)?;
        let language = Language::detect(&text);
        Ok(Query::new(text, language, QueryOrigin::User))
    }

    /// Canonical form of a piece of query text, without building a query
    pub fn canonical_text(&self, raw: &str) -> Result<String, RetrievalError> {
        let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

        if text.is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let length = text.chars().count();
        if length > self.max_chars {
            return Err(RetrievalError::InvalidQuery(format!(
                "Query is {} characters long, the maximum is {}",
                length, self.max_chars
            )));
        }

        if !text.chars().any(char::is_alphanumeric) {
            return Err(RetrievalError::InvalidQuery(
                "Query must contain at least one letter or digit".to_string(),
            ));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_collapses_whitespace() {
        let normalizer = QueryNormalizer::new(100);
        let query = normalizer.normalize("  petos \n\t 2015-2020  ").unwrap();
        assert_eq!(query.text(), "petos 2015-2020");
        assert_eq!(query.origin(), &QueryOrigin::User);
    }

    #[test]
    fn test_keeps_case_and_punctuation() {
        let normalizer = QueryNormalizer::new(100);
        let query = normalizer.normalize("Mitä KKO:2022:18 linjasi?").unwrap();
        assert_eq!(query.text(), "Mitä KKO:2022:18 linjasi?");
    }

    #[test]
    fn test_rejects_empty() {
        let normalizer = QueryNormalizer::new(100);
        assert!(matches!(
            normalizer.normalize("   \n "),
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_rejects_oversized() {
        let normalizer = QueryNormalizer::new(10);
        assert!(normalizer.normalize("0123456789").is_ok());
        assert!(matches!(
            normalizer.normalize("01234567890"),
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let normalizer = QueryNormalizer::new(5);
        assert!(normalizer.normalize("äöäöä").is_ok());
    }

    #[test]
    fn test_rejects_punctuation_only() {
        let normalizer = QueryNormalizer::new(100);
        assert!(normalizer.normalize("?!? ...").is_err());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let normalizer = QueryNormalizer::new(2000);
        for raw in [
            "petos 2015-2020",
            "  Milloin   yhtiökokous voidaan määrätä pidettäväksi? ",
            "What is the liability\tof a board member",
            "KKO 2024:76",
        ] {
            let once = normalizer.normalize(raw).unwrap();
            let twice = normalizer.normalize(once.text()).unwrap();
            assert_eq!(once, twice);
        }
    }
}
