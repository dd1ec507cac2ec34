//! Hash table over row indices split into power-of-two partitions.
//!
//! Build is two passes. Morsels of rows are scattered into per-partition
//! index lists (row order kept within each list), then every partition's
//! map is filled by exactly one task. No partition is ever touched by two
//! writers, so the maps need no locks.

use skiff_common::{OperationType, ParallelConfig};
use skiff_storage::kernels::HashBuckets;

use crate::scheduler::{parallel_for_with_result, parallel_tasks};

/// Read-only after build: `hash -> row indices` in ascending row order.
#[derive(Debug, Clone)]
pub struct PartitionedHashIndex {
    partitions: Vec<HashBuckets<Vec<u32>>>,
    mask: u64,
    rows: usize,
}

impl PartitionedHashIndex {
    /// Indexes every row of `hashes`.
    pub fn build(config: &ParallelConfig, hashes: &[u64]) -> Self {
        Self::build_filtered(config, hashes, |_| true)
    }

    /// Indexes only the rows for which `keep(row)` holds (e.g. non-null keys).
    ///
    /// One partition per worker when the cost model says the build is worth
    /// parallelizing, a single partition otherwise.
    pub fn build_filtered<K>(config: &ParallelConfig, hashes: &[u64], keep: K) -> Self
    where
        K: Fn(usize) -> bool + Sync,
    {
        let partitions =
            if config.should_parallelize_op(OperationType::JoinBuild, hashes.len()) {
                config.num_workers()
            } else {
                1
            };
        Self::with_partitions(config, hashes, partitions, keep)
    }

    /// Builds with an explicit partition count, rounded up to a power of two.
    pub fn with_partitions<K>(
        config: &ParallelConfig,
        hashes: &[u64],
        num_partitions: usize,
        keep: K,
    ) -> Self
    where
        K: Fn(usize) -> bool + Sync,
    {
        let p = num_partitions.max(1).next_power_of_two();
        let mask = (p - 1) as u64;
        let scatter = |start: usize, end: usize| {
            let mut lists: Vec<Vec<u32>> = vec![Vec::new(); p];
            for row in start..end {
                if keep(row) {
                    lists[(hashes[row] & mask) as usize].push(row as u32);
                }
            }
            lists
        };
        // chunks[morsel][partition], morsels in row order
        let chunks: Vec<Vec<Vec<u32>>> = if p > 1 {
            parallel_for_with_result(config, hashes.len(), scatter)
        } else {
            vec![scatter(0, hashes.len())]
        };

        let partitions = parallel_tasks(config, p, |part| {
            let mut map: HashBuckets<Vec<u32>> = HashBuckets::default();
            for chunk in &chunks {
                for &row in &chunk[part] {
                    map.entry(hashes[row as usize]).or_default().push(row);
                }
            }
            map
        });
        let rows = chunks.iter().flatten().map(Vec::len).sum();
        Self {
            partitions,
            mask,
            rows,
        }
    }

    /// Rows stored under exactly `hash`; empty when absent.
    pub fn lookup(&self, hash: u64) -> &[u32] {
        self.partitions[self.partition_of(hash)]
            .get(&hash)
            .map_or(&[], Vec::as_slice)
    }

    /// Partition owning `hash`: its low bits.
    pub fn partition_of(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    /// Partition count, always a power of two.
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Number of indexed rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// True when no row was indexed.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn keys_live_only_in_their_partition(
            hashes in proptest::collection::vec(0u64..64, 0..600),
            parts in 1usize..9,
        ) {
            let idx = PartitionedHashIndex::with_partitions(
                &ParallelConfig::eager(37, 4),
                &hashes,
                parts,
                |_| true,
            );
            prop_assert!(idx.num_partitions().is_power_of_two());
            prop_assert!(idx.num_partitions() >= parts);
            for (p, map) in idx.partitions.iter().enumerate() {
                for (h, rows) in map.iter() {
                    prop_assert_eq!(idx.partition_of(*h), p);
                    for r in rows {
                        prop_assert_eq!(hashes[*r as usize], *h);
                    }
                }
            }
            for (row, h) in hashes.iter().enumerate() {
                prop_assert!(idx.lookup(*h).contains(&(row as u32)));
            }
            prop_assert_eq!(idx.len(), hashes.len());
        }
    }

    #[test]
    fn rows_come_back_in_ascending_order() {
        let hashes: Vec<u64> = (0..5_000).map(|i| i % 7).collect();
        let idx = PartitionedHashIndex::with_partitions(
            &ParallelConfig::eager(128, 4),
            &hashes,
            4,
            |_| true,
        );
        let rows = idx.lookup(3);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rows.len(), (0..5_000).filter(|i| i % 7 == 3).count());
    }

    #[test]
    fn filtered_rows_are_skipped() {
        let hashes = vec![1, 2, 1, 2];
        let idx =
            PartitionedHashIndex::build_filtered(&ParallelConfig::sequential(), &hashes, |r| r != 2);
        assert_eq!(idx.lookup(1), &[0]);
        assert_eq!(idx.lookup(2), &[1, 3]);
        assert_eq!(idx.lookup(99), &[] as &[u32]);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.num_partitions(), 1);
    }
}
