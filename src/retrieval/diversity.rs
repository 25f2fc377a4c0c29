//! Per-document diversity capping of fused candidates

use super::FusedCandidate;
use crate::config::DiversityConfig;
use ahash::AHashMap;

/// Bound how many chunks of one parent document survive
///
/// The first `exempt_top_n` candidates always pass; they still count toward
/// their document's total. Beyond that, at most `max_per_document` entries
/// per document are kept in fused order. Dropped entries are not replaced.
pub fn cap(
    candidates: Vec<FusedCandidate>,
    max_per_document: usize,
    exempt_top_n: usize,
) -> Vec<FusedCandidate> {
    split(candidates, max_per_document, exempt_top_n)
        .0
        .into_iter()
        .map(|(_, candidate)| candidate)
        .collect()
}

/// Apply the configured diversity policy: cap, optional backfill, final limit
pub fn apply(candidates: Vec<FusedCandidate>, config: &DiversityConfig) -> Vec<FusedCandidate> {
    let before = candidates.len();
    let (kept, dropped) = split(candidates, config.max_per_document, config.exempt_top_n);
    let capped = kept.len();

    let mut result = if config.backfill && config.final_limit > 0 && kept.len() < config.final_limit
    {
        backfill(kept, dropped, config.final_limit)
    } else {
        kept.into_iter().map(|(_, c)| c).collect()
    };

    if config.final_limit > 0 {
        result.truncate(config.final_limit);
    }

    tracing::debug!(
        "Diversity cap (max {}/doc, top {} exempt): {} → {} → {}",
        config.max_per_document,
        config.exempt_top_n,
        before,
        capped,
        result.len()
    );

    result
}

type Positioned = Vec<(usize, FusedCandidate)>;

fn split(
    candidates: Vec<FusedCandidate>,
    max_per_document: usize,
    exempt_top_n: usize,
) -> (Positioned, Positioned) {
    let mut per_document: AHashMap<String, usize> = AHashMap::new();
    let mut kept = Vec::with_capacity(candidates.len());
    let mut dropped = Vec::new();

    for (position, candidate) in candidates.into_iter().enumerate() {
        let count = per_document.entry(candidate.document_id.clone()).or_insert(0);

        if position < exempt_top_n || *count < max_per_document {
            *count += 1;
            kept.push((position, candidate));
        } else {
            dropped.push((position, candidate));
        }
    }

    (kept, dropped)
}

/// Refill up to `target` from dropped candidates, keeping global fused order
fn backfill(kept: Positioned, dropped: Positioned, target: usize) -> Vec<FusedCandidate> {
    let missing = target.saturating_sub(kept.len());
    let mut merged: Positioned = kept;
    merged.extend(dropped.into_iter().take(missing));
    merged.sort_by_key(|(position, _)| *position);
    merged.into_iter().map(|(_, c)| c).collect()
}
