//! Configuration management for Lakihaku
//!
//! Loads the TOML configuration, applies profile and environment overrides
//! and validates the result. Environment variables are read here, at load
//! time only; the retrieval core receives an immutable [`RetrievalConfig`].

use crate::error::{LakihakuError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

/// Backing index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Tantivy writer heap in bytes
    pub writer_heap_bytes: usize,
    /// How many extra hits to fetch before post-filtering
    pub overfetch: usize,
}

/// When the prefix-expanded lexical source is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMode {
    Never,
    Fallback,
    Always,
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RRF damping constant
    pub rrf_k: f64,
    pub vector_top_k: usize,
    pub lexical_top_k: usize,
    pub metadata_top_k: usize,
    pub case_lookup_top_k: usize,
    /// Similarity floor for vector search; items at or below are excluded
    pub match_threshold: f32,
    pub max_query_chars: usize,
    /// Minimum capped result count for an attempt to count as a success
    pub min_results: usize,
    /// Reformulation attempts allowed after the first search
    pub retry_budget: u32,
    pub source_timeout_ms: u64,
    pub prefix_mode: PrefixMode,
    /// Lexical hit count below which the prefix fallback runs
    pub prefix_fallback_below: usize,
    pub prefix_fractions: Vec<f32>,
    pub prefix_min_term_chars: usize,
    pub case_lookup: bool,
    pub expansion: ExpansionConfig,
    pub diversity: DiversityConfig,
}

/// Multi-query expansion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    pub enabled: bool,
    pub variants: usize,
    pub timeout_ms: u64,
}

/// Per-document diversity cap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityConfig {
    pub max_per_document: usize,
    /// Top candidates that always pass, whatever their document
    pub exempt_top_n: usize,
    /// Final list size; 0 keeps every surviving candidate
    pub final_limit: usize,
    /// Refill dropped slots from capped-out candidates to reach `final_limit`
    pub backfill: bool,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_query: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_document: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfill: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_mode: Option<PrefixMode>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LakihakuError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LakihakuError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LakihakuError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LakihakuError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| LakihakuError::ProfileNotFound {
                name: profile.to_string(),
            })?;

        if let Some(enabled) = overrides.multi_query {
            self.retrieval.expansion.enabled = enabled;
        }
        if let Some(threshold) = overrides.match_threshold {
            self.retrieval.match_threshold = threshold;
        }
        if let Some(budget) = overrides.retry_budget {
            self.retrieval.retry_budget = budget;
        }
        if let Some(max) = overrides.max_per_document {
            self.retrieval.diversity.max_per_document = max;
        }
        if let Some(backfill) = overrides.backfill {
            self.retrieval.diversity.backfill = backfill;
        }
        if let Some(mode) = overrides.prefix_mode {
            self.retrieval.prefix_mode = mode;
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LAKIHAKU_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        let vars: Vec<(String, String)> = std::env::vars().collect();
        self.apply_overrides(vars);
    }

    /// Apply `LAKIHAKU_`-prefixed overrides from an explicit list of pairs
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("LAKIHAKU_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| LakihakuError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Cannot parse '{}'", value),
            })
        }

        match path {
            "RETRIEVAL__MULTI_QUERY" => self.retrieval.expansion.enabled = parse(path, value)?,
            "RETRIEVAL__MATCH_THRESHOLD" => self.retrieval.match_threshold = parse(path, value)?,
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse(path, value)?,
            "RETRIEVAL__MIN_RESULTS" => self.retrieval.min_results = parse(path, value)?,
            "RETRIEVAL__RETRY_BUDGET" => self.retrieval.retry_budget = parse(path, value)?,
            "RETRIEVAL__SOURCE_TIMEOUT_MS" => {
                self.retrieval.source_timeout_ms = parse(path, value)?
            }
            "RETRIEVAL__BACKFILL" => self.retrieval.diversity.backfill = parse(path, value)?,
            "RETRIEVAL__FINAL_LIMIT" => self.retrieval.diversity.final_limit = parse(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LakihakuError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lakihaku").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            embedding: EmbeddingConfig {
                model: "multilingual-e5-small".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            indexing: IndexingConfig {
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
                writer_heap_bytes: 50_000_000,
                overfetch: 4,
            },
            retrieval: RetrievalConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            vector_top_k: 50,
            lexical_top_k: 50,
            metadata_top_k: 20,
            case_lookup_top_k: 30,
            match_threshold: 0.3,
            max_query_chars: 2000,
            min_results: 3,
            retry_budget: 2,
            source_timeout_ms: 8_000,
            prefix_mode: PrefixMode::Fallback,
            prefix_fallback_below: 5,
            prefix_fractions: vec![0.5, 0.65, 0.8],
            prefix_min_term_chars: 8,
            case_lookup: true,
            expansion: ExpansionConfig {
                enabled: true,
                variants: 2,
                timeout_ms: 10_000,
            },
            diversity: DiversityConfig {
                max_per_document: 3,
                exempt_top_n: 2,
                final_limit: 15,
                backfill: false,
            },
        }
    }
}
