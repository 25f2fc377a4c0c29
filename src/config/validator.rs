use crate::config::Config;
use crate::error::{LakihakuError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_diversity(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LakihakuError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let indexing = &config.indexing;

        if indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        // Tantivy refuses writer budgets below 15MB
        if indexing.writer_heap_bytes < 15_000_000 {
            errors.push(ValidationError::new(
                "indexing.writer_heap_bytes",
                format!(
                    "Writer heap must be at least 15000000 bytes, got {}",
                    indexing.writer_heap_bytes
                ),
            ));
        }

        if indexing.overfetch == 0 {
            errors.push(ValidationError::new(
                "indexing.overfetch",
                "Overfetch factor must be at least 1",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if !(retrieval.rrf_k.is_finite() && retrieval.rrf_k > 0.0) {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a positive number, got {}", retrieval.rrf_k),
            ));
        }

        let threshold = retrieval.match_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            errors.push(ValidationError::new(
                "retrieval.match_threshold",
                format!("Match threshold must be between 0 and 1, got {}", threshold),
            ));
        }

        for (path, value) in [
            ("retrieval.vector_top_k", retrieval.vector_top_k),
            ("retrieval.lexical_top_k", retrieval.lexical_top_k),
            ("retrieval.metadata_top_k", retrieval.metadata_top_k),
            ("retrieval.case_lookup_top_k", retrieval.case_lookup_top_k),
            ("retrieval.max_query_chars", retrieval.max_query_chars),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Value must be greater than 0"));
            }
        }

        if retrieval.source_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.source_timeout_ms",
                "Source timeout must be greater than 0",
            ));
        }

        if retrieval.expansion.enabled && retrieval.expansion.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.expansion.timeout_ms",
                "Expansion timeout must be greater than 0 when expansion is enabled",
            ));
        }

        if retrieval.prefix_fractions.is_empty() {
            errors.push(ValidationError::new(
                "retrieval.prefix_fractions",
                "At least one prefix fraction is required",
            ));
        }

        for fraction in &retrieval.prefix_fractions {
            if !(*fraction > 0.0 && *fraction < 1.0) {
                errors.push(ValidationError::new(
                    "retrieval.prefix_fractions",
                    format!("Prefix fractions must be between 0 and 1, got {}", fraction),
                ));
            }
        }
    }

    fn validate_diversity(config: &Config, errors: &mut Vec<ValidationError>) {
        let diversity = &config.retrieval.diversity;

        if diversity.max_per_document == 0 {
            errors.push(ValidationError::new(
                "retrieval.diversity.max_per_document",
                "At least one chunk per document must be allowed",
            ));
        }

        if diversity.final_limit > 0 && diversity.exempt_top_n > diversity.final_limit {
            errors.push(ValidationError::new(
                "retrieval.diversity.exempt_top_n",
                format!(
                    "exempt_top_n ({}) cannot exceed final_limit ({})",
                    diversity.exempt_top_n, diversity.final_limit
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(LakihakuError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_match_threshold_range() {
        for bad in [0.0, 1.0, 1.5, -0.2] {
            let mut config = Config::default();
            config.retrieval.match_threshold = bad;
            assert!(error_paths(&config).contains(&"retrieval.match_threshold".to_string()));
        }
    }

    #[test]
    fn test_rrf_k_must_be_positive() {
        let mut config = Config::default();
        config.retrieval.rrf_k = 0.0;
        assert!(error_paths(&config).contains(&"retrieval.rrf_k".to_string()));
    }

    #[test]
    fn test_exempt_cannot_exceed_final_limit() {
        let mut config = Config::default();
        config.retrieval.diversity.final_limit = 1;
        config.retrieval.diversity.exempt_top_n = 2;
        assert!(error_paths(&config).contains(&"retrieval.diversity.exempt_top_n".to_string()));

        config.retrieval.diversity.final_limit = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.embedding.model = String::new();
        config.retrieval.prefix_fractions = vec![1.2];
        config.retrieval.vector_top_k = 0;

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 3);
    }
}
