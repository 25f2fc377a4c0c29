//! Structured search filters and year-range extraction

use crate::retrieval::ChunkPayload;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Filters applied by every candidate source
///
/// Empty sets and `None` bounds mean "no restriction", except for the
/// tenant scope: without one, only globally shared content is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Inclusive lower bound on document year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_min: Option<i32>,

    /// Inclusive upper bound on document year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_max: Option<i32>,

    /// Court identifiers to include (e.g. "KKO", "KHO")
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub court_types: BTreeSet<String>,

    /// Legal domain tags to include
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub legal_domains: BTreeSet<String>,

    /// Tenant whose private content is visible alongside shared content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_scope: Option<String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_years(mut self, year_min: Option<i32>, year_max: Option<i32>) -> Self {
        self.year_min = year_min;
        self.year_max = year_max;
        self
    }

    pub fn with_court(mut self, court: impl Into<String>) -> Self {
        self.court_types.insert(court.into().to_uppercase());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.legal_domains.insert(domain.into().to_lowercase());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_scope = Some(tenant.into());
        self
    }

    /// Fill missing year bounds from a range mentioned in the query text
    pub fn with_years_from_text(mut self, text: &str) -> Self {
        if self.year_min.is_none() && self.year_max.is_none() {
            if let Some((start, end)) = extract_year_range(text) {
                self.year_min = Some(start);
                self.year_max = Some(end);
            }
        }
        self
    }

    pub fn has_year_bounds(&self) -> bool {
        self.year_min.is_some() || self.year_max.is_some()
    }

    /// Check whether a retrieved chunk satisfies every filter
    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        if self.has_year_bounds() {
            let Some(year) = payload.year else {
                return false;
            };
            if self.year_min.is_some_and(|min| year < min) {
                return false;
            }
            if self.year_max.is_some_and(|max| year > max) {
                return false;
            }
        }

        if !self.court_types.is_empty() {
            match &payload.court {
                Some(court) if self.court_types.contains(&court.to_uppercase()) => {}
                _ => return false,
            }
        }

        if !self.legal_domains.is_empty()
            && !payload
                .legal_domains
                .iter()
                .any(|d| self.legal_domains.contains(&d.to_lowercase()))
        {
            return false;
        }

        match (&payload.tenant, &self.tenant_scope) {
            (None, _) => true,
            (Some(owner), Some(scope)) => owner == scope,
            (Some(_), None) => false,
        }
    }
}

struct YearPatterns {
    ranges: Vec<Regex>,
    single: Vec<Regex>,
}

fn year_patterns() -> &'static YearPatterns {
    static PATTERNS: OnceLock<YearPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("year pattern is valid");
        YearPatterns {
            ranges: vec![
                compile(r"(?i)from\s+(\d{4})\s+to\s+(\d{4})"),
                compile(r"(\d{4})\s*[-–]\s*(\d{4})"),
                compile(r"(?i)between\s+(\d{4})\s+and\s+(\d{4})"),
                compile(r"(?i)vuo(?:sien|sina|desta)\s+(\d{4})\s+(?:ja|-)\s+(\d{4})"),
                compile(r"(\d{4})\s+to\s+(\d{4})"),
            ],
            single: vec![
                compile(r"(?i)(?:^|from|year|in|vuonna|vuodelta|år)\s+(\d{4})\b"),
                compile(r"^(\d{4})$"),
            ],
        }
    })
}

/// Extract an inclusive year range from a query.
///
/// Ranges are returned ordered (`start <= end`); a single year yields
/// `(year, year)` when it lies between 1900 and 2100.
pub fn extract_year_range(text: &str) -> Option<(i32, i32)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let patterns = year_patterns();

    for pattern in &patterns.ranges {
        if let Some(caps) = pattern.captures(text) {
            let first: i32 = caps[1].parse().ok()?;
            let second: i32 = caps[2].parse().ok()?;
            return Some((first.min(second), first.max(second)));
        }
    }

    for pattern in &patterns.single {
        if let Some(caps) = pattern.captures(text) {
            let year: i32 = caps[1].parse().ok()?;
            if (1900..=2100).contains(&year) {
                return Some((year, year));
            }
        }
    }

    None
}
