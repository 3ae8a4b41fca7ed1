//! Reciprocal Rank Fusion (RRF) for combining search results.

use std::collections::HashMap;
use ulid::Ulid;

/// Conventional RRF constant.
/// Higher values give more weight to lower-ranked results.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Fuse multiple result lists using Reciprocal Rank Fusion.
///
/// RRF score = Σ 1 / (rrf_k + rank_i), with 1-based ranks.
///
/// Returns at most `limit` (id, fused_score) pairs, best first. Equal
/// scores keep the order in which ids were first seen.
pub fn reciprocal_rank_fusion(
    results: Vec<Vec<(Ulid, f32)>>,
    rrf_k: f32,
    limit: usize,
) -> Vec<(Ulid, f32)> {
    let mut position: HashMap<Ulid, usize> = HashMap::new();
    let mut fused: Vec<(Ulid, f32)> = Vec::new();

    for result_list in results {
        for (rank, (id, _original_score)) in result_list.into_iter().enumerate() {
            let rrf_score = 1.0 / (rrf_k + rank as f32 + 1.0);
            match position.get(&id) {
                Some(&idx) => fused[idx].1 += rrf_score,
                None => {
                    position.insert(id, fused.len());
                    fused.push((id, rrf_score));
                }
            }
        }
    }

    // Stable sort by score descending
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused.truncate(limit);

    fused
}
