//! Reciprocal Rank Fusion for combining ranked result lists

use super::{FusedCandidate, ScoredItem};
use ahash::{AHashMap, AHashSet};
use std::cmp::Ordering;

/// Default RRF damping constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Apply Reciprocal Rank Fusion to any number of ranked lists
///
/// RRF formula: score(id) = sum over all lists containing id of: 1 / (k + rank)
///
/// Ranks start at 1. Lists must be given in source-priority order; the
/// payload of each fused candidate comes from the first list containing it.
/// A repeated id inside one list only counts at its first position.
///
/// # Returns
/// Candidates sorted by fused score descending, ties broken by number of
/// lists (more first), then best rank (smaller first), then id.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredItem>], k: f64) -> Vec<FusedCandidate> {
    let mut positions: AHashMap<&str, usize> = AHashMap::new();
    let mut fused: Vec<FusedCandidate> = Vec::new();
    let mut ranks: Vec<Vec<usize>> = Vec::new();

    for list in lists {
        let mut seen_in_list: AHashSet<&str> = AHashSet::with_capacity(list.len());

        for (index, item) in list.iter().enumerate() {
            if !seen_in_list.insert(item.id.as_str()) {
                continue;
            }

            let rank = index + 1;

            match positions.get(item.id.as_str()) {
                Some(&at) => {
                    let candidate = &mut fused[at];
                    candidate.appearances += 1;
                    candidate.best_rank = candidate.best_rank.min(rank);
                    ranks[at].push(rank);
                }
                None => {
                    positions.insert(item.id.as_str(), fused.len());
                    fused.push(FusedCandidate {
                        id: item.id.clone(),
                        document_id: item.document_id.clone(),
                        score: 0.0,
                        payload: item.payload.clone(),
                        appearances: 1,
                        best_rank: rank,
                    });
                    ranks.push(vec![rank]);
                }
            }
        }
    }

    // Summed in ascending rank order so equal rank sets give equal scores
    for (candidate, mut ranks) in fused.iter_mut().zip(ranks) {
        ranks.sort_unstable();
        candidate.score = ranks.iter().map(|&rank| 1.0 / (k + rank as f64)).sum();
    }

    fused.sort_by(compare_candidates);
    fused
}

/// Total order used for fused lists
fn compare_candidates(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.appearances.cmp(&a.appearances))
        .then_with(|| a.best_rank.cmp(&b.best_rank))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ChunkPayload;

    fn item(id: &str) -> ScoredItem {
        ScoredItem::new(id, format!("doc-{}", id), 0.5, ChunkPayload::default())
    }

    fn list(ids: &[&str]) -> Vec<ScoredItem> {
        ids.iter().map(|id| item(id)).collect()
    }

    #[test]
    fn test_rrf_exact_scores_and_order() {
        let a = list(&["x", "y", "z"]);
        let b = list(&["y", "x", "w"]);

        let fused = reciprocal_rank_fusion(&[a, b], 60.0);
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "w", "z"]);

        let expected_xy = 1.0 / 61.0 + 1.0 / 62.0;
        assert_eq!(fused[0].score, expected_xy);
        assert_eq!(fused[1].score, expected_xy);
        // w and z both sit at rank 3 of one list; the id decides
        assert_eq!(fused[2].score, 1.0 / 63.0);
        assert_eq!(fused[3].score, 1.0 / 63.0);
    }

    #[test]
    fn test_rrf_same_ranks_in_any_list_order_tie_exactly() {
        // p ranks 1, 2, 3 and q ranks 3, 2, 1 across the lists
        let lists = vec![
            list(&["p", "a1", "q"]),
            list(&["b1", "p"]),
            list(&["c1", "q"]),
            list(&["q", "d1", "p"]),
        ];

        let fused = reciprocal_rank_fusion(&lists, 2.0);
        assert_eq!(fused[0].id, "p");
        assert_eq!(fused[1].id, "q");
        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(fused[0].appearances, 3);
        assert_eq!(fused[1].appearances, 3);
        assert_eq!(fused[0].best_rank, 1);
        assert_eq!(fused[1].best_rank, 1);
    }

    #[test]
    fn test_rrf_tie_prefers_more_lists() {
        // With k = 1: "a" scores 1/4 + 1/4 and "b" scores 1/2
        let l1 = list(&["f1", "f2", "a"]);
        let l2 = list(&["g1", "g2", "a"]);
        let l3 = list(&["b"]);

        let fused = reciprocal_rank_fusion(&[l1, l2, l3], 1.0);
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(ids[..4], ["a", "b", "f1", "g1"]);
        assert_eq!(fused[0].appearances, 2);
        assert_eq!(fused[0].best_rank, 3);
    }

    #[test]
    fn test_rrf_tie_prefers_best_rank_then_id() {
        // Each id appears once at the same rank in its own list
        let fused = reciprocal_rank_fusion(&[list(&["m"]), list(&["c"]), list(&["k"])], 60.0);
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "k", "m"]);
    }

    #[test]
    fn test_rrf_k_is_configurable() {
        let fused = reciprocal_rank_fusion(&[list(&["x", "y"])], 1.0);
        assert_eq!(fused[0].score, 0.5);
        assert_eq!(fused[1].score, 1.0 / 3.0);
    }

    #[test]
    fn test_rrf_payload_from_first_list() {
        let mut first = item("x");
        first.payload.title = "from first".to_string();
        let mut second = item("x");
        second.payload.title = "from second".to_string();

        let fused = reciprocal_rank_fusion(&[vec![first], vec![second]], 60.0);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].payload.title, "from first");
    }

    #[test]
    fn test_rrf_duplicate_within_list_counts_once() {
        let fused = reciprocal_rank_fusion(&[list(&["x", "x", "y"])], 60.0);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].score, 1.0 / 61.0);
        assert_eq!(fused[0].appearances, 1);
        assert_eq!(fused[1].score, 1.0 / 63.0);
    }

    #[test]
    fn test_rrf_deterministic() {
        let lists = vec![
            list(&["e", "d", "c", "b", "a"]),
            list(&["a", "b", "c", "d", "e"]),
            list(&["c", "f"]),
        ];
        let first = reciprocal_rank_fusion(&lists, DEFAULT_RRF_K);
        for _ in 0..10 {
            assert_eq!(reciprocal_rank_fusion(&lists, DEFAULT_RRF_K), first);
        }
    }

    #[test]
    fn test_rrf_empty() {
        assert!(reciprocal_rank_fusion(&[], 60.0).is_empty());
        assert!(reciprocal_rank_fusion(&[Vec::new(), Vec::new()], 60.0).is_empty());
    }
}
