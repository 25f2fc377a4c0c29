//! Multi-query expansion

use super::{mentions_case_id, Query, QueryNormalizer, QueryRewriter};
use crate::config::ExpansionConfig;
use std::sync::Arc;
use std::time::Duration;

/// Produces alternative phrasings of a query for independent retrieval
pub struct QueryExpander {
    rewriter: Arc<dyn QueryRewriter>,
    normalizer: QueryNormalizer,
    enabled: bool,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(
        rewriter: Arc<dyn QueryRewriter>,
        normalizer: QueryNormalizer,
        config: &ExpansionConfig,
    ) -> Self {
        Self {
            rewriter,
            normalizer,
            enabled: config.enabled,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Expand a query into itself plus up to `n` alternatives.
    ///
    /// The original query is always element 0. Expansion is skipped when
    /// disabled or when the query names a specific case, and any rewriter
    /// failure or timeout degrades to `[query]`.
    pub async fn expand(&self, query: &Query, n: usize) -> Vec<Query> {
        let mut expanded = vec![query.clone()];

        if !self.enabled || n == 0 {
            return expanded;
        }

        if mentions_case_id(query.text()) {
            tracing::debug!("Query names a case id, skipping expansion");
            return expanded;
        }

        let generated =
            match tokio::time::timeout(self.timeout, self.rewriter.generate_variants(query.text(), n))
                .await
            {
                Ok(Ok(variants)) => variants,
                Ok(Err(e)) => {
                    tracing::warn!("Multi-query expansion failed (non-critical): {}", e);
                    return expanded;
                }
                Err(_) => {
                    tracing::warn!(
                        "Multi-query expansion timed out after {}ms",
                        self.timeout.as_millis()
                    );
                    return expanded;
                }
            };

        for variant in generated {
            if expanded.len() > n {
                break;
            }

            let Ok(text) = self.normalizer.canonical_text(&variant) else {
                tracing::debug!("Dropping unusable expansion variant: {:?}", variant);
                continue;
            };

            let duplicate = expanded
                .iter()
                .any(|q| q.text().to_lowercase() == text.to_lowercase());
            if !duplicate {
                let index = expanded.len();
                expanded.push(query.expansion(text, index));
            }
        }

        if expanded.len() > 1 {
            tracing::info!("Multi-query expansion → {} alternatives", expanded.len() - 1);
            for (i, alt) in expanded.iter().enumerate().skip(1) {
                tracing::debug!("  alt-{}: {}", i, alt.text());
            }
        }

        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryOrigin, RewriteError};
    use async_trait::async_trait;

    struct FixedRewriter(Vec<&'static str>);

    #[async_trait]
    impl QueryRewriter for FixedRewriter {
        async fn generate_variants(&self, _text: &str, _n: usize) -> Result<Vec<String>, RewriteError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }

        async fn broaden(&self, text: &str) -> Result<String, RewriteError> {
            Ok(text.to_string())
        }
    }

    struct FailingRewriter;

    #[async_trait]
    impl QueryRewriter for FailingRewriter {
        async fn generate_variants(&self, _text: &str, _n: usize) -> Result<Vec<String>, RewriteError> {
            Err(RewriteError::Unavailable("model offline".to_string()))
        }

        async fn broaden(&self, _text: &str) -> Result<String, RewriteError> {
            Err(RewriteError::Unavailable("model offline".to_string()))
        }
    }

    fn expander(rewriter: Arc<dyn QueryRewriter>, enabled: bool) -> QueryExpander {
        let config = ExpansionConfig {
            enabled,
            variants: 2,
            timeout_ms: 1_000,
        };
        QueryExpander::new(rewriter, QueryNormalizer::new(200), &config)
    }

    fn query(text: &str) -> Query {
        QueryNormalizer::new(200).normalize(text).unwrap()
    }

    #[tokio::test]
    async fn test_original_is_first_and_variants_bounded() {
        let rewriter = Arc::new(FixedRewriter(vec!["toinen muoto", "kolmas muoto", "neljäs muoto"]));
        let expanded = expander(rewriter, true).expand(&query("petos"), 2).await;

        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[0].text(), "petos");
        assert_eq!(expanded[1].text(), "toinen muoto");
        assert_eq!(
            expanded[2].origin(),
            &QueryOrigin::Expansion {
                parent: "petos".to_string(),
                variant: 2
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_returns_only_original() {
        let rewriter = Arc::new(FixedRewriter(vec!["toinen muoto"]));
        let expanded = expander(rewriter, false).expand(&query("petos"), 2).await;
        assert_eq!(expanded, vec![query("petos")]);
    }

    #[tokio::test]
    async fn test_case_id_skips_expansion() {
        let rewriter = Arc::new(FixedRewriter(vec!["toinen muoto"]));
        let expanded = expander(rewriter, true)
            .expand(&query("Mitä KKO:2022:18 ratkaisi?"), 2)
            .await;
        assert_eq!(expanded.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_original() {
        let expanded = expander(Arc::new(FailingRewriter), true)
            .expand(&query("petos"), 2)
            .await;
        assert_eq!(expanded, vec![query("petos")]);
    }

    #[tokio::test]
    async fn test_duplicates_and_blank_variants_dropped() {
        let rewriter = Arc::new(FixedRewriter(vec!["PETOS", "   ", "petos  rangaistus"]));
        let expanded = expander(rewriter, true).expand(&query("petos"), 2).await;

        let texts: Vec<&str> = expanded.iter().map(|q| q.text()).collect();
        assert_eq!(texts, vec!["petos", "petos rangaistus"]);
    }
}
