//! Public-input schema of the update circuits.
//!
//! Both the prover (off-chain) and the controller (reconstructing inputs from
//! live state) build signals through these types, so the ordering and padding
//! exist in exactly one place.

use alloy::primitives::{B256, U256};

use super::accumulator::Accumulator;
use crate::crypto::poseidon::{is_canonical, zero_value};

/// Which circuit a proof belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitKind {
    SingleUpdate,
    MassUpdate,
}

impl CircuitKind {
    pub fn name(&self) -> &'static str {
        match self {
            CircuitKind::SingleUpdate => "update",
            CircuitKind::MassUpdate => "mass_update",
        }
    }
}

impl std::fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CircuitError {
    #[error("expected {expected} public signals, got {got}")]
    SignalCount { expected: usize, got: usize },

    #[error("signal {index} is not a canonical field element")]
    NonCanonical { index: usize },

    #[error("start index does not fit in 64 bits")]
    StartIndexOverflow,

    #[error("batch of {got} leaves exceeds circuit batch size {batch_size}")]
    BatchTooLarge { got: usize, batch_size: usize },
}

fn field_to_signal(value: &B256) -> U256 {
    U256::from_be_bytes(value.0)
}

fn signal_to_field(signal: U256, index: usize) -> Result<B256, CircuitError> {
    let value = B256::from(signal.to_be_bytes::<32>());
    if is_canonical(value) {
        Ok(value)
    } else {
        Err(CircuitError::NonCanonical { index })
    }
}

fn signal_to_index(signal: U256) -> Result<u64, CircuitError> {
    u64::try_from(signal).map_err(|_| CircuitError::StartIndexOverflow)
}

/// Public inputs of the single-leaf update circuit.
///
/// Signals: `[startIndex, leaf, priorFrontier.., newFrontier..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleUpdateInputs {
    pub start_index: u64,
    pub leaf: B256,
    pub prior_frontier: Vec<B256>,
    pub new_frontier: Vec<B256>,
}

impl SingleUpdateInputs {
    pub fn signal_count(depth: usize) -> usize {
        2 + 2 * depth
    }

    /// Prover-side witness derivation: the honest successor of `prior_frontier`.
    pub fn derive(
        acc: &Accumulator,
        start_index: u64,
        leaf: B256,
        prior_frontier: &[B256],
    ) -> Self {
        let transition = acc.compute_transition(start_index, &[leaf], prior_frontier);
        Self {
            start_index,
            leaf,
            prior_frontier: prior_frontier.to_vec(),
            new_frontier: transition.frontier,
        }
    }

    pub fn to_signals(&self) -> Vec<U256> {
        let mut signals = Vec::with_capacity(2 + self.prior_frontier.len() * 2);
        signals.push(U256::from(self.start_index));
        signals.push(field_to_signal(&self.leaf));
        signals.extend(self.prior_frontier.iter().map(field_to_signal));
        signals.extend(self.new_frontier.iter().map(field_to_signal));
        signals
    }

    pub fn from_signals(depth: usize, signals: &[U256]) -> Result<Self, CircuitError> {
        let expected = Self::signal_count(depth);
        if signals.len() != expected {
            return Err(CircuitError::SignalCount { expected, got: signals.len() });
        }
        let fields = |range: std::ops::Range<usize>| {
            range
                .map(|i| signal_to_field(signals[i], i))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            start_index: signal_to_index(signals[0])?,
            leaf: signal_to_field(signals[1], 1)?,
            prior_frontier: fields(2..2 + depth)?,
            new_frontier: fields(2 + depth..2 + 2 * depth)?,
        })
    }

    /// The relation the circuit enforces.
    pub fn is_satisfied(&self, acc: &Accumulator) -> bool {
        if self.prior_frontier.len() != acc.depth()
            || self.new_frontier.len() != acc.depth()
            || self.start_index >= acc.capacity()
        {
            return false;
        }
        let transition =
            acc.compute_transition(self.start_index, &[self.leaf], &self.prior_frontier);
        transition.frontier == self.new_frontier
    }
}

/// Public inputs of the mass update circuit.
///
/// Signals: `[startIndex, leaves[batch].., priorFrontier.., newFrontier.., newRoot]`.
/// Batches shorter than the circuit batch size are padded with the empty-leaf
/// sentinel; the real leaves are the prefix before the first sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MassUpdateInputs {
    pub start_index: u64,
    /// Always exactly `batch_size` entries.
    pub leaves: Vec<B256>,
    pub prior_frontier: Vec<B256>,
    pub new_frontier: Vec<B256>,
    pub new_root: B256,
}

impl MassUpdateInputs {
    pub fn signal_count(depth: usize, batch_size: usize) -> usize {
        2 + batch_size + 2 * depth
    }

    /// Pad `pending` with the sentinel up to `batch_size`.
    pub fn pad_leaves(pending: &[B256], batch_size: usize) -> Result<Vec<B256>, CircuitError> {
        if pending.len() > batch_size {
            return Err(CircuitError::BatchTooLarge { got: pending.len(), batch_size });
        }
        let mut padded = pending.to_vec();
        padded.resize(batch_size, zero_value());
        Ok(padded)
    }

    pub fn new(
        batch_size: usize,
        start_index: u64,
        pending: &[B256],
        prior_frontier: &[B256],
        new_frontier: Vec<B256>,
        new_root: B256,
    ) -> Result<Self, CircuitError> {
        Ok(Self {
            start_index,
            leaves: Self::pad_leaves(pending, batch_size)?,
            prior_frontier: prior_frontier.to_vec(),
            new_frontier,
            new_root,
        })
    }

    /// Prover-side witness derivation for the pending batch.
    pub fn derive(
        acc: &Accumulator,
        batch_size: usize,
        start_index: u64,
        pending: &[B256],
        prior_frontier: &[B256],
    ) -> Result<Self, CircuitError> {
        let transition = acc.compute_transition(start_index, pending, prior_frontier);
        Self::new(
            batch_size,
            start_index,
            pending,
            prior_frontier,
            transition.frontier,
            transition.root,
        )
    }

    /// Leaves actually absorbed by the circuit.
    pub fn real_leaves(&self) -> &[B256] {
        let sentinel = zero_value();
        let len = self
            .leaves
            .iter()
            .position(|leaf| *leaf == sentinel)
            .unwrap_or(self.leaves.len());
        &self.leaves[..len]
    }

    pub fn to_signals(&self) -> Vec<U256> {
        let mut signals =
            Vec::with_capacity(2 + self.leaves.len() + 2 * self.prior_frontier.len());
        signals.push(U256::from(self.start_index));
        signals.extend(self.leaves.iter().map(field_to_signal));
        signals.extend(self.prior_frontier.iter().map(field_to_signal));
        signals.extend(self.new_frontier.iter().map(field_to_signal));
        signals.push(field_to_signal(&self.new_root));
        signals
    }

    pub fn from_signals(
        depth: usize,
        batch_size: usize,
        signals: &[U256],
    ) -> Result<Self, CircuitError> {
        let expected = Self::signal_count(depth, batch_size);
        if signals.len() != expected {
            return Err(CircuitError::SignalCount { expected, got: signals.len() });
        }
        let fields = |range: std::ops::Range<usize>| {
            range
                .map(|i| signal_to_field(signals[i], i))
                .collect::<Result<Vec<_>, _>>()
        };
        let frontier_start = 1 + batch_size;
        Ok(Self {
            start_index: signal_to_index(signals[0])?,
            leaves: fields(1..frontier_start)?,
            prior_frontier: fields(frontier_start..frontier_start + depth)?,
            new_frontier: fields(frontier_start + depth..frontier_start + 2 * depth)?,
            new_root: signal_to_field(signals[expected - 1], expected - 1)?,
        })
    }

    /// The relation the circuit enforces.
    pub fn is_satisfied(&self, acc: &Accumulator) -> bool {
        if self.prior_frontier.len() != acc.depth() || self.new_frontier.len() != acc.depth() {
            return false;
        }
        let real = self.real_leaves();
        // Sentinel padding must be a contiguous suffix.
        let sentinel = zero_value();
        if self.leaves[real.len()..].iter().any(|leaf| *leaf != sentinel) {
            return false;
        }
        let fits = self
            .start_index
            .checked_add(real.len() as u64)
            .is_some_and(|end| end <= acc.capacity());
        if !fits || (real.is_empty() && self.start_index >= acc.capacity()) {
            return false;
        }
        let transition = acc.compute_transition(self.start_index, real, &self.prior_frontier);
        transition.frontier == self.new_frontier && transition.root == self.new_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poseidon::random_leaves;

    #[test]
    fn test_single_signal_layout() {
        let acc = Accumulator::new(3);
        let leaf = B256::left_padding_from(&[9]);
        let inputs = SingleUpdateInputs::derive(&acc, 0, leaf, &acc.initial_frontier());
        let signals = inputs.to_signals();

        assert_eq!(signals.len(), SingleUpdateInputs::signal_count(3));
        assert_eq!(signals[0], U256::ZERO);
        assert_eq!(signals[1], U256::from(9));
        assert_eq!(signals[2], U256::from_be_bytes(acc.zeros()[0].0));
        assert_eq!(signals[5], U256::from(9)); // new frontier[0] is the leaf
        assert_eq!(SingleUpdateInputs::from_signals(3, &signals).unwrap(), inputs);
        assert!(inputs.is_satisfied(&acc));
    }

    #[test]
    fn test_mass_padding_uses_sentinel() {
        let acc = Accumulator::new(4);
        let mut rng = ark_std::test_rng();
        let pending = random_leaves(&mut rng, 3);
        let inputs =
            MassUpdateInputs::derive(&acc, 5, 0, &pending, &acc.initial_frontier()).unwrap();

        assert_eq!(inputs.leaves.len(), 5);
        assert_eq!(inputs.leaves[3], zero_value());
        assert_eq!(inputs.leaves[4], zero_value());
        assert_eq!(inputs.real_leaves(), &pending[..]);
        assert_eq!(inputs.new_root, acc.frontier_from_leaves(&pending).root);
        assert!(inputs.is_satisfied(&acc));
    }

    #[test]
    fn test_mass_signal_layout() {
        let acc = Accumulator::new(4);
        let mut rng = ark_std::test_rng();
        let pending = random_leaves(&mut rng, 2);
        let inputs =
            MassUpdateInputs::derive(&acc, 2, 0, &pending, &acc.initial_frontier()).unwrap();
        let signals = inputs.to_signals();

        assert_eq!(signals.len(), MassUpdateInputs::signal_count(4, 2));
        assert_eq!(signals[1], U256::from_be_bytes(pending[0].0));
        assert_eq!(*signals.last().unwrap(), U256::from_be_bytes(inputs.new_root.0));
        assert_eq!(MassUpdateInputs::from_signals(4, 2, &signals).unwrap(), inputs);
    }

    #[test]
    fn test_mass_rejects_wrong_root() {
        let acc = Accumulator::new(4);
        let mut rng = ark_std::test_rng();
        let pending = random_leaves(&mut rng, 4);
        let mut inputs =
            MassUpdateInputs::derive(&acc, 4, 0, &pending, &acc.initial_frontier()).unwrap();
        inputs.new_root = B256::left_padding_from(&[1]);
        assert!(!inputs.is_satisfied(&acc));
    }

    #[test]
    fn test_mass_rejects_leaf_after_padding() {
        let acc = Accumulator::new(4);
        let mut rng = ark_std::test_rng();
        let pending = random_leaves(&mut rng, 2);
        let mut inputs =
            MassUpdateInputs::derive(&acc, 4, 0, &pending, &acc.initial_frontier()).unwrap();
        inputs.leaves[3] = pending[0];
        assert!(!inputs.is_satisfied(&acc));
    }

    #[test]
    fn test_batch_too_large() {
        let leaves = vec![B256::left_padding_from(&[1]); 3];
        assert_eq!(
            MassUpdateInputs::pad_leaves(&leaves, 2),
            Err(CircuitError::BatchTooLarge { got: 3, batch_size: 2 })
        );
    }

    #[test]
    fn test_signal_count_mismatch() {
        let err = SingleUpdateInputs::from_signals(3, &[U256::ZERO; 4]).unwrap_err();
        assert_eq!(err, CircuitError::SignalCount { expected: 8, got: 4 });
    }

    #[test]
    fn test_non_canonical_signal() {
        let acc = Accumulator::new(2);
        let inputs = SingleUpdateInputs::derive(
            &acc,
            0,
            B256::left_padding_from(&[3]),
            &acc.initial_frontier(),
        );
        let mut signals = inputs.to_signals();
        signals[1] = U256::MAX;
        assert_eq!(
            SingleUpdateInputs::from_signals(2, &signals),
            Err(CircuitError::NonCanonical { index: 1 })
        );
    }
}
