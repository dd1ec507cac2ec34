//! Join match collection over a [`PartitionedHashIndex`].

use skiff_common::{OperationType, ParallelConfig};

use crate::hash_index::PartitionedHashIndex;
use crate::scheduler::parallel_for_with_result;

/// One `(left_row, right_row)` pair; `None` marks an unmatched side.
pub type MatchPair = (Option<u32>, Option<u32>);

/// Probes `right_index` with every left row's hash and lets `match_fn`
/// decide which candidates really match.
///
/// `match_fn(left_row, candidates, out)` must check key equality (hash
/// collisions reach it) and push the accepted `(left, right)` pairs. Each
/// morsel fills its own vector; partials are concatenated in morsel order, and
/// candidates arrive in ascending right-row order, so the result is sorted by
/// `(left, right)` whenever `match_fn` pushes in candidate order.
pub fn collect_matches<F>(
    config: &ParallelConfig,
    left_height: usize,
    left_hashes: &[u64],
    right_index: &PartitionedHashIndex,
    match_fn: F,
) -> Vec<(u32, u32)>
where
    F: Fn(usize, &[u32], &mut Vec<(u32, u32)>) + Sync,
{
    let probe = |start: usize, end: usize| {
        let mut local = Vec::new();
        for row in start..end {
            let candidates = right_index.lookup(left_hashes[row]);
            if !candidates.is_empty() {
                match_fn(row, candidates, &mut local);
            }
        }
        local
    };
    if !config.should_parallelize_op(OperationType::JoinProbe, left_height) {
        return probe(0, left_height);
    }
    parallel_for_with_result(config, left_height, probe)
        .into_iter()
        .flatten()
        .collect()
}
