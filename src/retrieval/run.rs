//! Record of one retrieval pipeline execution

use super::{FusedCandidate, ScoredItem, SourceKind, Termination};
use crate::query::{FilterSet, Query};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of one source call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStatus {
    Ok,
    /// Backing store reported a total outage
    Unavailable,
    TimedOut,
}

/// The ranked list one source returned for one query variant
#[derive(Debug, Clone, Serialize)]
pub struct SourceList {
    /// Index into the attempt's variants; 0 is the attempt query itself
    pub variant: usize,
    pub source: SourceKind,
    pub status: ListStatus,
    pub items: Vec<ScoredItem>,
}

impl SourceList {
    pub fn is_ok(&self) -> bool {
        self.status == ListStatus::Ok
    }
}

/// One search attempt: expansion, fan-out, fusion and capping
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub number: u32,
    pub query: Query,
    /// Queries actually issued, `variants[0] == query`
    pub variants: Vec<Query>,
    pub lists: Vec<SourceList>,
    pub fused_count: usize,
    pub candidates: Vec<FusedCandidate>,
}

impl AttemptRecord {
    pub fn result_count(&self) -> usize {
        self.candidates.len()
    }
}

/// Everything one `retrieve` call did, plus its final candidate list
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalRun {
    pub run_id: Uuid,
    pub query: Query,
    pub filters: FilterSet,
    pub attempts: Vec<AttemptRecord>,
    pub candidates: Vec<FusedCandidate>,
    pub termination: Termination,
    /// Sources called at least once, in priority order
    pub sources_consulted: Vec<SourceKind>,
    /// Sources that timed out or were unavailable in some attempt
    pub degraded_sources: Vec<SourceKind>,
}

impl RetrievalRun {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn reformulation_count(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }

    pub fn is_exhausted(&self) -> bool {
        self.termination == Termination::Exhausted
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Every query issued across all attempts, in order
    pub fn issued_queries(&self) -> impl Iterator<Item = &Query> {
        self.attempts.iter().flat_map(|a| a.variants.iter())
    }

    pub fn into_candidates(self) -> Vec<FusedCandidate> {
        self.candidates
    }
}
