use std::sync::Arc;

use alloy::primitives::{keccak256, Address, B256};
use tokio::sync::Mutex;

use crate::adapters::abi::perform_mass_update_calldata;
use crate::arborist::{Arborist, ArboristError};
use crate::domain::events::ArboristEvent;
use crate::domain::proof::Groth16Proof;
use crate::ports::chain::{ChainError, TreeChain};
use crate::ports::token::LinkToken;
use crate::ports::verifier::ProofVerifier;
use crate::ports::{MassUpdateRequest, TreeInfo, TxReceipt};
use crate::tree::TreeError;

impl From<ArboristError> for ChainError {
    fn from(e: ArboristError) -> Self {
        match e {
            ArboristError::UnknownTree(tree) => ChainError::TreeNotFound(tree),
            ArboristError::Tree(TreeError::InsufficientLinkBalance { .. }) => {
                ChainError::InsufficientLinkBalance
            }
            ArboristError::Tree(TreeError::EmptyQueue) => ChainError::EmptyQueue,
            ArboristError::Tree(TreeError::InvalidProof(_)) => ChainError::InvalidProof,
            other => ChainError::Reverted(other.to_string()),
        }
    }
}

/// In-process `TreeChain` over a shared orchestrator.
///
/// Calls are serialized by the mutex, which gives the same one-transaction-
/// at-a-time ordering a chain does. Clones share the ledger.
pub struct LocalChain<T: LinkToken, V: ProofVerifier> {
    arborist: Arc<Mutex<Arborist<T, V>>>,
}

impl<T: LinkToken, V: ProofVerifier> Clone for LocalChain<T, V> {
    fn clone(&self) -> Self {
        Self {
            arborist: Arc::clone(&self.arborist),
        }
    }
}

impl<T: LinkToken, V: ProofVerifier> LocalChain<T, V> {
    pub fn new(arborist: Arborist<T, V>) -> Self {
        Self {
            arborist: Arc::new(Mutex::new(arborist)),
        }
    }

    /// Shared handle for user-side calls (funding, commits, collection).
    pub fn arborist(&self) -> Arc<Mutex<Arborist<T, V>>> {
        Arc::clone(&self.arborist)
    }
}

impl<T, V> TreeChain for LocalChain<T, V>
where
    T: LinkToken + Send,
    V: ProofVerifier + Send,
{
    async fn events_since(&self, cursor: usize) -> Result<(Vec<ArboristEvent>, usize), ChainError> {
        let arborist = self.arborist.lock().await;
        let events = arborist.events();
        let start = cursor.min(events.len());
        Ok((events[start..].to_vec(), events.len()))
    }

    async fn tree_info(&self, tree: Address) -> Result<TreeInfo, ChainError> {
        Ok(self.arborist.lock().await.tree_info(tree)?)
    }

    async fn check_mass_update(&self, tree: Address) -> Result<MassUpdateRequest, ChainError> {
        Ok(self.arborist.lock().await.check_mass_update(tree)?)
    }

    async fn perform_mass_update(
        &self,
        tree: Address,
        node: Address,
        new_root: B256,
        new_frontier: Vec<B256>,
        proof: Groth16Proof,
    ) -> Result<TxReceipt, ChainError> {
        let tx_hash = keccak256(perform_mass_update_calldata(new_root, &new_frontier, &proof));
        self.arborist
            .lock()
            .await
            .perform_mass_update(tree, node, new_root, new_frontier, &proof)?;
        Ok(TxReceipt {
            tx_hash,
            success: true,
        })
    }
}
