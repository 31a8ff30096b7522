//! Per-tree state machine: commitment queue, frontier, and the proof-gated
//! update paths.
//!
//! Every operation runs all of its checks before touching state, so a failed
//! call leaves the tree exactly as it was.

use alloy::primitives::{Address, B256, U256};
use tracing::{debug, info};

use crate::crypto::poseidon::{is_canonical, zero_value};
use crate::domain::accumulator::Accumulator;
use crate::domain::circuit::{CircuitKind, MassUpdateInputs, SingleUpdateInputs};
use crate::domain::proof::Groth16Proof;
use crate::ports::verifier::ProofVerifier;
use crate::ports::MassUpdateRequest;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("capacity exceeded: {pending}/{batch_size} pending, {inserted}/{capacity} inserted")]
    CapacityExceeded {
        pending: usize,
        batch_size: usize,
        inserted: u64,
        capacity: u64,
    },

    #[error("proof rejected by the {0} verifier")]
    InvalidProof(CircuitKind),

    #[error("payer balance {available} cannot cover payment {needed}")]
    InsufficientLinkBalance { needed: U256, available: U256 },

    #[error("{caller} is not authorized for this operation")]
    Unauthorized { caller: Address },

    #[error("leaf {0} is not committable (out of field or padding sentinel)")]
    InvalidLeaf(B256),

    #[error("no pending leaves")]
    EmptyQueue,

    #[error("frontier must have {expected} entries, got {got}")]
    FrontierLength { expected: usize, got: usize },

    #[error("tree {0} has no payment record")]
    Unregistered(Address),
}

/// Outcome of the queue-full notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Oracle request emitted with this request id.
    Requested { request_id: B256 },
    /// Payment-free ready notification emitted.
    Ready,
    /// Paid trigger withheld: the payer cannot cover the payment.
    Blocked(TreeError),
}

/// Receipt of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Global index assigned to the leaf.
    pub index: u64,
    pub pending: usize,
    /// Present when this commit filled the queue.
    pub trigger: Option<TriggerOutcome>,
}

/// Which update path settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Single,
    Mass,
}

/// Notified when a tree's pending queue reaches its batch size.
pub trait OnQueueFull {
    fn on_queue_full(&mut self, tree: Address) -> TriggerOutcome;
}

/// Notified when an update has been verified, before the tree applies it.
///
/// An error aborts the update; the hook must not have mutated anything in
/// that case.
pub trait OnUpdateSettled {
    fn on_update_settled(
        &mut self,
        tree: Address,
        submitter: Address,
        kind: UpdateKind,
    ) -> Result<(), TreeError>;
}

/// Tells the tree whether its next batch can be paid for.
pub trait PaymentGate {
    fn ensure_payable(&self, tree: Address) -> Result<(), TreeError>;
}

/// No-op hooks for a tree that is not attached to an orchestrator.
impl OnQueueFull for () {
    fn on_queue_full(&mut self, _tree: Address) -> TriggerOutcome {
        TriggerOutcome::Ready
    }
}

impl OnUpdateSettled for () {
    fn on_update_settled(
        &mut self,
        _tree: Address,
        _submitter: Address,
        _kind: UpdateKind,
    ) -> Result<(), TreeError> {
        Ok(())
    }
}

impl PaymentGate for () {
    fn ensure_payable(&self, _tree: Address) -> Result<(), TreeError> {
        Ok(())
    }
}

/// One VMTree instance.
#[derive(Debug, Clone)]
pub struct TreeController {
    address: Address,
    controller: Address,
    batch_size: usize,
    accumulator: Accumulator,
    frontier: Vec<B256>,
    /// Last verified root.
    root: B256,
    start_index: u64,
    pending: Vec<B256>,
}

impl TreeController {
    pub fn new(address: Address, controller: Address, depth: usize, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        let accumulator = Accumulator::new(depth);
        Self {
            address,
            controller,
            batch_size,
            frontier: accumulator.initial_frontier(),
            root: accumulator.empty_root(),
            accumulator,
            start_index: 0,
            pending: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn depth(&self) -> usize {
        self.accumulator.depth()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// `getFilledSubtrees()`.
    pub fn filled_subtrees(&self) -> &[B256] {
        &self.frontier
    }

    pub fn root(&self) -> B256 {
        self.root
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn pending(&self) -> &[B256] {
        &self.pending
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() == self.batch_size
    }

    /// Leaves inserted or queued so far.
    pub fn leaf_count(&self) -> u64 {
        self.start_index + self.pending.len() as u64
    }

    /// Append a leaf to the pending queue.
    pub fn commit<H: OnQueueFull>(
        &mut self,
        leaf: B256,
        hooks: &mut H,
    ) -> Result<CommitReceipt, TreeError> {
        if !is_canonical(leaf) || leaf == zero_value() {
            return Err(TreeError::InvalidLeaf(leaf));
        }
        if self.is_full() || self.leaf_count() >= self.accumulator.capacity() {
            return Err(TreeError::CapacityExceeded {
                pending: self.pending.len(),
                batch_size: self.batch_size,
                inserted: self.start_index,
                capacity: self.accumulator.capacity(),
            });
        }

        let index = self.leaf_count();
        self.pending.push(leaf);
        debug!(tree = %self.address, index, pending = self.pending.len(), "leaf committed");

        let trigger = if self.is_full() {
            info!(tree = %self.address, start_index = self.start_index, "pending queue full");
            Some(hooks.on_queue_full(self.address))
        } else {
            None
        };

        Ok(CommitReceipt {
            index,
            pending: self.pending.len(),
            trigger,
        })
    }

    /// `checkMassUpdate()`: the data an off-chain prover needs for the pending batch.
    pub fn check_mass_update<G: PaymentGate>(
        &self,
        gate: &G,
    ) -> Result<MassUpdateRequest, TreeError> {
        if self.pending.is_empty() {
            return Err(TreeError::EmptyQueue);
        }
        gate.ensure_payable(self.address)?;
        Ok(MassUpdateRequest {
            leaves: self.pending.clone(),
            frontier: self.frontier.clone(),
            start_index: self.start_index,
        })
    }

    /// Public inputs of the single update the live state expects.
    pub fn single_update_inputs(
        &self,
        new_frontier: Vec<B256>,
    ) -> Result<SingleUpdateInputs, TreeError> {
        let leaf = *self.pending.first().ok_or(TreeError::EmptyQueue)?;
        Ok(SingleUpdateInputs {
            start_index: self.start_index,
            leaf,
            prior_frontier: self.frontier.clone(),
            new_frontier,
        })
    }

    /// Public inputs of the mass update the live state expects.
    pub fn mass_update_inputs(
        &self,
        new_root: B256,
        new_frontier: Vec<B256>,
    ) -> Result<MassUpdateInputs, TreeError> {
        if self.pending.is_empty() {
            return Err(TreeError::EmptyQueue);
        }
        MassUpdateInputs::new(
            self.batch_size,
            self.start_index,
            &self.pending,
            &self.frontier,
            new_frontier,
            new_root,
        )
        .map_err(|_| TreeError::CapacityExceeded {
            pending: self.pending.len(),
            batch_size: self.batch_size,
            inserted: self.start_index,
            capacity: self.accumulator.capacity(),
        })
    }

    fn check_frontier_len(&self, frontier: &[B256]) -> Result<(), TreeError> {
        if frontier.len() != self.depth() {
            return Err(TreeError::FrontierLength {
                expected: self.depth(),
                got: frontier.len(),
            });
        }
        Ok(())
    }

    /// Single-leaf path: absorb the head of the queue. Controller only.
    pub fn update<V: ProofVerifier, H: OnUpdateSettled>(
        &mut self,
        caller: Address,
        proof: &Groth16Proof,
        new_frontier: Vec<B256>,
        verifier: &V,
        hooks: &mut H,
    ) -> Result<(), TreeError> {
        if caller != self.controller {
            return Err(TreeError::Unauthorized { caller });
        }
        self.check_frontier_len(&new_frontier)?;
        let inputs = self.single_update_inputs(new_frontier)?;
        if !verifier.verify(CircuitKind::SingleUpdate, &inputs.to_signals(), proof) {
            return Err(TreeError::InvalidProof(CircuitKind::SingleUpdate));
        }

        // The circuit exposes no root; re-derive it from the verified leaf.
        let transition = self
            .accumulator
            .compute_transition(self.start_index, &[inputs.leaf], &self.frontier);
        hooks.on_update_settled(self.address, caller, UpdateKind::Single)?;

        self.frontier = inputs.new_frontier;
        self.root = transition.root;
        self.start_index += 1;
        self.pending.remove(0);
        info!(
            tree = %self.address,
            start_index = self.start_index,
            root = %self.root,
            "single update applied"
        );
        Ok(())
    }

    /// Batch path: absorb the whole pending queue.
    pub fn perform_mass_update<V: ProofVerifier, H: OnUpdateSettled>(
        &mut self,
        caller: Address,
        new_root: B256,
        new_frontier: Vec<B256>,
        proof: &Groth16Proof,
        verifier: &V,
        hooks: &mut H,
    ) -> Result<(), TreeError> {
        self.check_frontier_len(&new_frontier)?;
        let inputs = self.mass_update_inputs(new_root, new_frontier)?;
        if !verifier.verify(CircuitKind::MassUpdate, &inputs.to_signals(), proof) {
            return Err(TreeError::InvalidProof(CircuitKind::MassUpdate));
        }
        hooks.on_update_settled(self.address, caller, UpdateKind::Mass)?;

        let consumed = self.pending.len();
        self.frontier = inputs.new_frontier;
        self.root = inputs.new_root;
        self.start_index += consumed as u64;
        self.pending.clear();
        info!(
            tree = %self.address,
            node = %caller,
            consumed,
            start_index = self.start_index,
            root = %self.root,
            "mass update applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_prover::MockVerifier;
    use crate::crypto::poseidon::random_leaves;

    const TREE: Address = Address::new([0x77; 20]);
    const CONTROLLER: Address = Address::new([0xc0; 20]);

    fn tree(batch: usize) -> TreeController {
        TreeController::new(TREE, CONTROLLER, 4, batch)
    }

    #[derive(Default)]
    struct Recorder {
        full: Vec<Address>,
        settled: Vec<(Address, UpdateKind)>,
        refuse: bool,
    }

    impl OnQueueFull for Recorder {
        fn on_queue_full(&mut self, tree: Address) -> TriggerOutcome {
            self.full.push(tree);
            TriggerOutcome::Ready
        }
    }

    impl OnUpdateSettled for Recorder {
        fn on_update_settled(
            &mut self,
            _tree: Address,
            submitter: Address,
            kind: UpdateKind,
        ) -> Result<(), TreeError> {
            if self.refuse {
                return Err(TreeError::InsufficientLinkBalance {
                    needed: U256::from(1),
                    available: U256::ZERO,
                });
            }
            self.settled.push((submitter, kind));
            Ok(())
        }
    }

    #[test]
    fn test_commit_until_full_notifies_once() {
        let mut t = tree(3);
        let mut hooks = Recorder::default();
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 3);

        assert!(t.commit(leaves[0], &mut hooks).unwrap().trigger.is_none());
        assert!(t.commit(leaves[1], &mut hooks).unwrap().trigger.is_none());
        let receipt = t.commit(leaves[2], &mut hooks).unwrap();
        assert_eq!(receipt.index, 2);
        assert_eq!(receipt.trigger, Some(TriggerOutcome::Ready));
        assert_eq!(hooks.full, vec![TREE]);
    }

    #[test]
    fn test_commit_over_batch_fails_unchanged() {
        let mut t = tree(2);
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 3);
        t.commit(leaves[0], &mut ()).unwrap();
        t.commit(leaves[1], &mut ()).unwrap();

        let err = t.commit(leaves[2], &mut ()).unwrap_err();
        assert!(matches!(err, TreeError::CapacityExceeded { pending: 2, .. }));
        assert_eq!(t.pending(), &leaves[..2]);
    }

    #[test]
    fn test_commit_rejects_sentinel_and_out_of_field() {
        let mut t = tree(2);
        assert_eq!(
            t.commit(zero_value(), &mut ()),
            Err(TreeError::InvalidLeaf(zero_value()))
        );
        let huge = B256::repeat_byte(0xff);
        assert_eq!(t.commit(huge, &mut ()), Err(TreeError::InvalidLeaf(huge)));
        assert!(t.pending().is_empty());
    }

    #[test]
    fn test_mass_update_applies_transition() {
        let mut t = tree(4);
        let mut hooks = Recorder::default();
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 4);
        for leaf in &leaves {
            t.commit(*leaf, &mut hooks).unwrap();
        }

        let verifier = MockVerifier::new(4, 4);
        let request = t.check_mass_update(&()).unwrap();
        let inputs = MassUpdateInputs::derive(
            t.accumulator(),
            4,
            request.start_index,
            &request.leaves,
            &request.frontier,
        )
        .unwrap();
        let proof = verifier.prove(CircuitKind::MassUpdate, &inputs.to_signals());
        let node = Address::repeat_byte(0x0d);

        t.perform_mass_update(
            node,
            inputs.new_root,
            inputs.new_frontier.clone(),
            &proof,
            &verifier,
            &mut hooks,
        )
        .unwrap();

        let expected = t.accumulator().frontier_from_leaves(&leaves);
        assert_eq!(t.filled_subtrees(), &expected.frontier[..]);
        assert_eq!(t.root(), expected.root);
        assert_eq!(t.start_index(), 4);
        assert!(t.pending().is_empty());
        assert_eq!(hooks.settled, vec![(node, UpdateKind::Mass)]);
    }

    #[test]
    fn test_partial_batch_mass_update() {
        let mut t = tree(4);
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 2);
        for leaf in &leaves {
            t.commit(*leaf, &mut ()).unwrap();
        }
        let verifier = MockVerifier::new(4, 4);
        let inputs =
            MassUpdateInputs::derive(t.accumulator(), 4, 0, &leaves, t.filled_subtrees()).unwrap();
        let proof = verifier.prove(CircuitKind::MassUpdate, &inputs.to_signals());

        t.perform_mass_update(
            Address::ZERO,
            inputs.new_root,
            inputs.new_frontier,
            &proof,
            &verifier,
            &mut (),
        )
        .unwrap();
        assert_eq!(t.start_index(), 2);
        assert_eq!(t.root(), t.accumulator().frontier_from_leaves(&leaves).root);
    }

    #[test]
    fn test_single_updates_match_one_mass_update() {
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 3);
        let verifier = MockVerifier::new(4, 3);
        let mut singles = tree(3);
        let mut batched = tree(3);
        for leaf in &leaves {
            singles.commit(*leaf, &mut ()).unwrap();
            batched.commit(*leaf, &mut ()).unwrap();
        }

        for leaf in &leaves {
            let inputs = SingleUpdateInputs::derive(
                singles.accumulator(),
                singles.start_index(),
                *leaf,
                singles.filled_subtrees(),
            );
            let proof = verifier.prove(CircuitKind::SingleUpdate, &inputs.to_signals());
            singles
                .update(CONTROLLER, &proof, inputs.new_frontier, &verifier, &mut ())
                .unwrap();
        }

        let inputs = MassUpdateInputs::derive(
            batched.accumulator(),
            3,
            0,
            &leaves,
            batched.filled_subtrees(),
        )
        .unwrap();
        let proof = verifier.prove(CircuitKind::MassUpdate, &inputs.to_signals());
        batched
            .perform_mass_update(
                Address::ZERO,
                inputs.new_root,
                inputs.new_frontier,
                &proof,
                &verifier,
                &mut (),
            )
            .unwrap();

        assert_eq!(singles.filled_subtrees(), batched.filled_subtrees());
        assert_eq!(singles.root(), batched.root());
        assert_eq!(singles.start_index(), batched.start_index());
        assert!(singles.pending().is_empty());
    }

    #[test]
    fn test_settlement_refusal_rolls_back() {
        let mut t = tree(2);
        let mut rng = ark_std::test_rng();
        let leaves = random_leaves(&mut rng, 2);
        for leaf in &leaves {
            t.commit(*leaf, &mut ()).unwrap();
        }
        let verifier = MockVerifier::new(4, 2);
        let inputs =
            MassUpdateInputs::derive(t.accumulator(), 2, 0, &leaves, t.filled_subtrees()).unwrap();
        let proof = verifier.prove(CircuitKind::MassUpdate, &inputs.to_signals());
        let mut hooks = Recorder {
            refuse: true,
            ..Default::default()
        };
        let before = t.filled_subtrees().to_vec();

        let err = t
            .perform_mass_update(
                Address::ZERO,
                inputs.new_root,
                inputs.new_frontier,
                &proof,
                &verifier,
                &mut hooks,
            )
            .unwrap_err();
        assert!(matches!(err, TreeError::InsufficientLinkBalance { .. }));
        assert_eq!(t.filled_subtrees(), &before[..]);
        assert_eq!(t.pending().len(), 2);
    }

    #[test]
    fn test_single_update_controller_only() {
        let mut t = tree(2);
        let leaf = B256::left_padding_from(&[5]);
        t.commit(leaf, &mut ()).unwrap();
        let verifier = MockVerifier::new(4, 2);
        let inputs = SingleUpdateInputs::derive(t.accumulator(), 0, leaf, t.filled_subtrees());
        let proof = verifier.prove(CircuitKind::SingleUpdate, &inputs.to_signals());
        let intruder = Address::repeat_byte(0x99);

        assert_eq!(
            t.update(intruder, &proof, inputs.new_frontier.clone(), &verifier, &mut ()),
            Err(TreeError::Unauthorized { caller: intruder })
        );
        t.update(CONTROLLER, &proof, inputs.new_frontier.clone(), &verifier, &mut ())
            .unwrap();
        assert_eq!(t.start_index(), 1);
        assert_eq!(t.filled_subtrees(), &inputs.new_frontier[..]);
        assert_eq!(t.root(), t.accumulator().frontier_from_leaves(&[leaf]).root);
    }

    #[test]
    fn test_wrong_frontier_length() {
        let mut t = tree(1);
        t.commit(B256::left_padding_from(&[5]), &mut ()).unwrap();
        let verifier = MockVerifier::new(4, 1);
        let proof = Groth16Proof::from_flat([U256::ZERO; 8]);
        let frontier = vec![B256::ZERO; 3];
        assert_eq!(
            t.perform_mass_update(Address::ZERO, B256::ZERO, frontier, &proof, &verifier, &mut ()),
            Err(TreeError::FrontierLength { expected: 4, got: 3 })
        );
    }

    #[test]
    fn test_check_mass_update_empty() {
        assert_eq!(tree(2).check_mass_update(&()), Err(TreeError::EmptyQueue));
    }

    #[test]
    fn test_tree_capacity_bound() {
        let mut t = TreeController::new(TREE, CONTROLLER, 1, 4);
        t.commit(B256::left_padding_from(&[1]), &mut ()).unwrap();
        t.commit(B256::left_padding_from(&[2]), &mut ()).unwrap();
        assert!(matches!(
            t.commit(B256::left_padding_from(&[3]), &mut ()),
            Err(TreeError::CapacityExceeded { capacity: 2, .. })
        ));
    }
}
