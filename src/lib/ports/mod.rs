pub mod chain;
pub mod prover;
pub mod token;
pub mod verifier;

use alloy::primitives::{Address, B256};

/// Everything an off-chain prover needs to build a mass update witness.
///
/// Returned by the tree's `checkMassUpdate` accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MassUpdateRequest {
    /// Pending leaves, unpadded, in insertion order.
    pub leaves: Vec<B256>,
    /// Current filled subtrees.
    pub frontier: Vec<B256>,
    /// Global index of `leaves[0]`.
    pub start_index: u64,
}

/// Static parameters of a cloned tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeInfo {
    pub tree: Address,
    pub controller: Address,
    pub payer: Address,
    pub name: String,
    pub depth: usize,
    pub batch_size: usize,
    /// Number of settled mass updates.
    pub epoch: u64,
}

/// Minimal transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
}
