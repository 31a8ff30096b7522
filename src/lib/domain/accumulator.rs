//! Frontier-only incremental Merkle accumulator.
//!
//! A tree of depth `d` is represented by `d` "filled subtree" values, one per
//! level, plus the number of leaves inserted so far. This is enough to append
//! leaves and to derive the root without keeping the full tree.

use alloy::primitives::B256;

use crate::crypto::poseidon::{poseidon2, zero_value};

/// Depth of the trees cloned by the orchestrator (2^20 leaves).
pub const TREE_DEPTH: usize = 20;

/// Result of absorbing a batch of leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Filled subtrees after the batch.
    pub frontier: Vec<B256>,
    /// Root of the zero-padded tree after the batch.
    pub root: B256,
}

/// Precomputed empty-subtree values for a fixed depth.
#[derive(Debug, Clone)]
pub struct Accumulator {
    depth: usize,
    /// `zeros[i]` is the root of an empty subtree of height `i`; `zeros[depth]`
    /// is the empty-tree root.
    zeros: Vec<B256>,
}

impl Accumulator {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0 && depth < 64, "unsupported tree depth {depth}");
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero_value());
        for level in 0..depth {
            let below = zeros[level];
            zeros.push(poseidon2(below, below));
        }
        Self { depth, zeros }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of leaves the tree can hold.
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn zeros(&self) -> &[B256] {
        &self.zeros
    }

    pub fn empty_root(&self) -> B256 {
        self.zeros[self.depth]
    }

    /// Frontier of a tree with no leaves.
    pub fn initial_frontier(&self) -> Vec<B256> {
        self.zeros[..self.depth].to_vec()
    }

    /// Append `leaves` starting at global index `start_index`.
    ///
    /// Folding this one leaf at a time gives the same result as a single call
    /// with the whole batch.
    ///
    /// # Panics
    ///
    /// If `prior_frontier` does not have `depth` entries, if
    /// `start_index + leaves.len()` exceeds the capacity, or if asked for the
    /// root of an already full tree with an empty batch (not derivable from a
    /// frontier).
    pub fn compute_transition(
        &self,
        start_index: u64,
        leaves: &[B256],
        prior_frontier: &[B256],
    ) -> Transition {
        assert_eq!(
            prior_frontier.len(),
            self.depth,
            "frontier must have one entry per level"
        );
        let end = start_index
            .checked_add(leaves.len() as u64)
            .filter(|end| *end <= self.capacity())
            .unwrap_or_else(|| {
                panic!(
                    "capacity exceeded: {} leaves from index {start_index} into a tree of {}",
                    leaves.len(),
                    self.capacity()
                )
            });

        let mut frontier = prior_frontier.to_vec();
        let mut full_root = None;
        for (offset, leaf) in leaves.iter().enumerate() {
            let index = start_index + offset as u64;
            full_root = self.absorb(&mut frontier, index, *leaf);
        }

        let root = match full_root {
            Some(root) => root,
            None => self.root_from_frontier(&frontier, end).unwrap_or_else(|| {
                panic!("root of a full tree is not derivable from its frontier")
            }),
        };
        Transition { frontier, root }
    }

    /// Insert one leaf; returns the tree root if the propagation overflowed the
    /// top level, which happens only for the last leaf of a full tree.
    fn absorb(&self, frontier: &mut [B256], index: u64, leaf: B256) -> Option<B256> {
        let mut current = leaf;
        for (level, filled) in frontier.iter_mut().enumerate() {
            if (index >> level) & 1 == 0 {
                *filled = current;
                return None;
            }
            current = poseidon2(*filled, current);
        }
        Some(current)
    }

    /// Root of the zero-padded tree holding `leaf_count` leaves.
    ///
    /// Returns `None` for a full tree: its right-most path is never stored.
    pub fn root_from_frontier(&self, frontier: &[B256], leaf_count: u64) -> Option<B256> {
        if leaf_count >= self.capacity() || frontier.len() != self.depth {
            return None;
        }
        let mut current = self.zeros[0];
        for (level, filled) in frontier.iter().enumerate() {
            current = if (leaf_count >> level) & 1 == 1 {
                poseidon2(*filled, current)
            } else {
                poseidon2(current, self.zeros[level])
            };
        }
        Some(current)
    }

    /// Frontier and root of a fresh tree holding exactly `leaves`.
    pub fn frontier_from_leaves(&self, leaves: &[B256]) -> Transition {
        self.compute_transition(0, leaves, &self.initial_frontier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poseidon::random_leaves;

    /// Root of the full zero-padded tree, level by level.
    fn naive_root(depth: usize, leaves: &[B256]) -> B256 {
        let mut level: Vec<B256> = leaves.to_vec();
        level.resize(1 << depth, zero_value());
        while level.len() > 1 {
            level = level.chunks(2).map(|pair| poseidon2(pair[0], pair[1])).collect();
        }
        level[0]
    }

    #[test]
    fn test_zeros_chain() {
        let acc = Accumulator::new(4);
        assert_eq!(acc.zeros().len(), 5);
        assert_eq!(acc.zeros()[0], zero_value());
        assert_eq!(acc.zeros()[1], poseidon2(zero_value(), zero_value()));
        assert_eq!(acc.empty_root(), naive_root(4, &[]));
    }

    #[test]
    fn test_empty_batch_is_identity() {
        let acc = Accumulator::new(4);
        let frontier = acc.initial_frontier();
        let t = acc.compute_transition(0, &[], &frontier);
        assert_eq!(t.frontier, frontier);
        assert_eq!(t.root, acc.empty_root());
    }

    #[test]
    fn test_root_matches_naive_tree() {
        let acc = Accumulator::new(4);
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 16);
        for n in 0..=16 {
            let t = acc.frontier_from_leaves(&leaves[..n]);
            assert_eq!(t.root, naive_root(4, &leaves[..n]), "leaf count {n}");
        }
    }

    #[test]
    fn test_single_leaf_fold_equals_batch() {
        let acc = Accumulator::new(5);
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 13);
        let start = acc.frontier_from_leaves(&leaves[..3]);

        let batch = acc.compute_transition(3, &leaves[3..], &start.frontier);

        let mut frontier = start.frontier.clone();
        let mut root = start.root;
        for (i, leaf) in leaves[3..].iter().enumerate() {
            let t = acc.compute_transition(3 + i as u64, &[*leaf], &frontier);
            frontier = t.frontier;
            root = t.root;
        }
        assert_eq!(batch.frontier, frontier);
        assert_eq!(batch.root, root);
    }

    #[test]
    fn test_left_child_stops_propagation() {
        let acc = Accumulator::new(3);
        let leaf = B256::left_padding_from(&[7]);
        let t = acc.compute_transition(0, &[leaf], &acc.initial_frontier());
        assert_eq!(t.frontier[0], leaf);
        assert_eq!(&t.frontier[1..], &acc.zeros()[1..3]);
    }

    #[test]
    fn test_root_from_frontier_full_tree_is_none() {
        let acc = Accumulator::new(2);
        let frontier = acc.initial_frontier();
        assert!(acc.root_from_frontier(&frontier, 4).is_none());
        assert_eq!(acc.root_from_frontier(&frontier, 0), Some(acc.empty_root()));
    }

    #[test]
    #[should_panic(expected = "capacity exceeded")]
    fn test_capacity_overflow_panics() {
        let acc = Accumulator::new(2);
        let leaves = vec![B256::left_padding_from(&[1]); 5];
        acc.compute_transition(0, &leaves, &acc.initial_frontier());
    }
}
