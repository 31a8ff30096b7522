use std::future::Future;

use alloy::primitives::{Address, B256};

use super::{MassUpdateRequest, TreeInfo, TxReceipt};
use crate::domain::events::ArboristEvent;
use crate::domain::proof::Groth16Proof;

/// Port for the oracle node's view of the ledger.
///
/// Implementations:
/// - `LocalChain` (in-process ledger behind a mutex)
pub trait TreeChain: Send + Sync {
    /// Events emitted at or after position `cursor`, and the next cursor.
    fn events_since(
        &self,
        cursor: usize,
    ) -> impl Future<Output = Result<(Vec<ArboristEvent>, usize), ChainError>> + Send;

    fn tree_info(&self, tree: Address) -> impl Future<Output = Result<TreeInfo, ChainError>> + Send;

    /// Read the pending batch (`checkMassUpdate`).
    fn check_mass_update(
        &self,
        tree: Address,
    ) -> impl Future<Output = Result<MassUpdateRequest, ChainError>> + Send;

    /// Submit `performMassUpdate(newRoot, newFrontier, proof)` as `node`.
    fn perform_mass_update(
        &self,
        tree: Address,
        node: Address,
        new_root: B256,
        new_frontier: Vec<B256>,
        proof: Groth16Proof,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("tree not found: {0}")]
    TreeNotFound(Address),

    #[error("payer cannot cover the oracle payment")]
    InsufficientLinkBalance,

    #[error("nothing pending")]
    EmptyQueue,

    #[error("proof rejected")]
    InvalidProof,

    #[error("transaction reverted: {0}")]
    Reverted(String),
}
