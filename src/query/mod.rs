//! Query model: normalization, expansion, rewriting and filters
//!
//! A [`Query`] is built once per user turn by the [`QueryNormalizer`] and is
//! never mutated afterwards. Expansion and reformulation produce child
//! queries whose [`QueryOrigin`] points back at the text they came from.

mod case_id;
mod expander;
mod filters;
mod normalizer;
mod rewriter;

pub use case_id::{extract_case_ids, mentions_case_id};
pub use expander::QueryExpander;
pub use filters::{extract_year_range, FilterSet};
pub use normalizer::QueryNormalizer;
pub use rewriter::{HeuristicRewriter, IdentityRewriter, QueryRewriter, RewriteError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Query language tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(rename = "fi")]
    Finnish,
    #[serde(rename = "sv")]
    Swedish,
    #[serde(rename = "en")]
    English,
}

const SWEDISH_MARKERS: &[&str] = &[
    "och", "att", "är", "för", "som", "inte", "vad", "när", "hur", "enligt", "skadestånd",
    "bedrägeri", "avtal", "straff",
];

const ENGLISH_MARKERS: &[&str] = &[
    "the", "what", "when", "which", "is", "are", "of", "and", "does", "can", "under", "court",
    "liability", "fraud", "damages",
];

impl Language {
    /// Guess the language of a query.
    ///
    /// Counts marker words per language and falls back to Finnish for short
    /// or undecided input, since the corpus is predominantly Finnish.
    pub fn detect(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.len() < 2 {
            return Language::Finnish;
        }

        let swedish = words
            .iter()
            .filter(|w| SWEDISH_MARKERS.contains(w))
            .count()
            + usize::from(lowered.contains('å'));
        let english = words.iter().filter(|w| ENGLISH_MARKERS.contains(w)).count();

        if swedish > english && swedish >= 1 {
            Language::Swedish
        } else if english > swedish && english >= 2 {
            Language::English
        } else {
            Language::Finnish
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Finnish => "fi",
            Language::Swedish => "sv",
            Language::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Where a query came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOrigin {
    /// Typed by the user
    User,
    /// Alternative phrasing produced by multi-query expansion
    Expansion { parent: String, variant: usize },
    /// Broader rewrite produced after an attempt came back short
    Reformulation { parent: String, attempt: u32 },
}

/// Normalized, immutable search query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    language: Language,
    origin: QueryOrigin,
}

impl Query {
    pub(crate) fn new(text: String, language: Language, origin: QueryOrigin) -> Self {
        Self {
            text,
            language,
            origin,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn origin(&self) -> &QueryOrigin {
        &self.origin
    }

    /// Child query produced by expansion
    pub(crate) fn expansion(&self, text: String, variant: usize) -> Self {
        Self {
            language: self.language,
            origin: QueryOrigin::Expansion {
                parent: self.text.clone(),
                variant,
            },
            text,
        }
    }

    /// Child query produced by reformulation
    pub(crate) fn reformulation(&self, text: String, attempt: u32) -> Self {
        Self {
            language: self.language,
            origin: QueryOrigin::Reformulation {
                parent: self.text.clone(),
                attempt,
            },
            text,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_finnish_default() {
        assert_eq!(
            Language::detect("Milloin petoksesta voidaan tuomita ehdollista vankeutta?"),
            Language::Finnish
        );
        assert_eq!(Language::detect("petos"), Language::Finnish);
    }

    #[test]
    fn test_detect_swedish() {
        assert_eq!(
            Language::detect("När är skadestånd för bedrägeri möjligt?"),
            Language::Swedish
        );
    }

    #[test]
    fn test_detect_english() {
        assert_eq!(
            Language::detect("What is the liability of a board member?"),
            Language::English
        );
    }

    #[test]
    fn test_child_queries_keep_provenance() {
        let parent = Query::new("petos".to_string(), Language::Finnish, QueryOrigin::User);
        let child = parent.reformulation("petos rangaistus".to_string(), 1);

        assert_eq!(child.language(), Language::Finnish);
        assert_eq!(
            child.origin(),
            &QueryOrigin::Reformulation {
                parent: "petos".to_string(),
                attempt: 1
            }
        );
    }
}
