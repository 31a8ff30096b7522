//! Off-chain oracle node: watches the orchestrator's events, proves pending
//! batches and submits them for payment.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use tracing::{debug, info, warn};

use crate::domain::accumulator::Accumulator;
use crate::domain::circuit::{CircuitError, MassUpdateInputs};
use crate::domain::events::ArboristEvent;
use crate::ports::chain::{ChainError, TreeChain};
use crate::ports::prover::{Prover, ProverError};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("prover error: {0}")]
    Prover(#[from] ProverError),

    #[error("witness error: {0}")]
    Circuit(#[from] CircuitError),
}

/// What happened to one triggered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Proof accepted, payment credited to this node.
    Submitted {
        tree: Address,
        start_index: u64,
        consumed: usize,
        tx_hash: B256,
    },
    /// Nothing to do: the queue was already drained or cannot be paid for.
    Skipped { tree: Address, reason: ChainError },
    /// Another submission landed first and moved the state under our proof.
    Lost { tree: Address },
    /// Job aborted before submission.
    Failed { tree: Address, error: String },
}

pub struct OracleNode<C: TreeChain, P: Prover> {
    chain: C,
    prover: P,
    address: Address,
    cursor: usize,
    accumulators: HashMap<usize, Accumulator>,
}

impl<C: TreeChain, P: Prover> OracleNode<C, P> {
    pub fn new(chain: C, prover: P, address: Address) -> Self {
        Self {
            chain,
            prover,
            address,
            cursor: 0,
            accumulators: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Process every event emitted since the last poll.
    pub async fn poll_once(&mut self) -> Result<Vec<JobOutcome>, NodeError> {
        let (events, next) = self.chain.events_since(self.cursor).await?;
        self.cursor = next;

        let mut outcomes = Vec::new();
        for event in events {
            let tree = match &event {
                ArboristEvent::OracleRequest(req) => {
                    debug!(
                        tree = %req.callback_target,
                        request_id = %req.request_id,
                        "oracle request"
                    );
                    req.callback_target
                }
                ArboristEvent::BatchReady { tree, .. } => *tree,
                _ => continue,
            };
            let outcome = match self.run_job(tree).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(%tree, error = %e, "job failed");
                    JobOutcome::Failed {
                        tree,
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Prove and submit the pending batch of `tree`.
    pub async fn run_job(&mut self, tree: Address) -> Result<JobOutcome, NodeError> {
        let request = match self.chain.check_mass_update(tree).await {
            Ok(request) => request,
            Err(reason @ (ChainError::EmptyQueue | ChainError::InsufficientLinkBalance)) => {
                info!(%tree, %reason, "job skipped");
                return Ok(JobOutcome::Skipped { tree, reason });
            }
            Err(e) => return Err(e.into()),
        };
        let info = self.chain.tree_info(tree).await?;
        let accumulator = self
            .accumulators
            .entry(info.depth)
            .or_insert_with(|| Accumulator::new(info.depth));

        let inputs = MassUpdateInputs::derive(
            accumulator,
            info.batch_size,
            request.start_index,
            &request.leaves,
            &request.frontier,
        )?;
        let proof = self.prover.prove_mass(&inputs).await?;

        let consumed = request.leaves.len();
        match self
            .chain
            .perform_mass_update(tree, self.address, inputs.new_root, inputs.new_frontier, proof)
            .await
        {
            Ok(receipt) => {
                info!(%tree, consumed, tx = %receipt.tx_hash, "mass update submitted");
                Ok(JobOutcome::Submitted {
                    tree,
                    start_index: request.start_index,
                    consumed,
                    tx_hash: receipt.tx_hash,
                })
            }
            Err(ChainError::InvalidProof | ChainError::EmptyQueue) => {
                warn!(%tree, "lost the race for this batch");
                Ok(JobOutcome::Lost { tree })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll until `shutdown` resolves.
    pub async fn run_until<F: Future<Output = ()>>(
        &mut self,
        poll_interval: Duration,
        shutdown: F,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        tokio::pin!(shutdown);
        info!(node = %self.address, ?poll_interval, "oracle node started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "poll failed");
                    }
                }
            }
        }
        info!(node = %self.address, "oracle node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local_chain::LocalChain;
    use crate::adapters::memory_token::{link_total_supply, MemoryLinkToken, ONE_LINK};
    use crate::adapters::mock_prover::{MockProver, MockVerifier};
    use crate::arborist::{Arborist, ArboristSettings};
    use crate::config::TriggerMode;
    use crate::crypto::poseidon::random_leaves;
    use alloy::primitives::U256;

    type Chain = LocalChain<MemoryLinkToken, MockVerifier>;

    const ARBORIST: Address = Address::new([0xab; 20]);
    const TOKEN: Address = Address::new([0x1c; 20]);
    const PAYER: Address = Address::new([0xaa; 20]);
    const NODE: Address = Address::new([0x0d; 20]);

    fn setup(trigger: TriggerMode, funding: U256) -> (Chain, Address) {
        let prover = MockProver::new(4, 2);
        let token = MemoryLinkToken::new(TOKEN, PAYER, link_total_supply());
        let settings = ArboristSettings {
            depth: 4,
            batch_size: 2,
            trigger,
        };
        let mut arborist = Arborist::new(ARBORIST, token, prover.verifier(), settings);
        let tree = arborist.transfer_and_call(PAYER, funding, &[]).unwrap();
        (LocalChain::new(arborist), tree)
    }

    async fn fill(chain: &Chain, tree: Address) {
        let mut rng = ark_std::test_rng();
        let handle = chain.arborist();
        let mut arborist = handle.lock().await;
        for leaf in random_leaves(&mut rng, 2) {
            arborist.commit(tree, leaf).unwrap();
        }
    }

    #[tokio::test]
    async fn test_node_settles_triggered_batch() {
        let (chain, tree) = setup(TriggerMode::default(), ONE_LINK);
        let mut node = OracleNode::new(chain.clone(), MockProver::new(4, 2), NODE);
        fill(&chain, tree).await;

        let outcomes = node.poll_once().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], JobOutcome::Submitted { consumed: 2, start_index: 0, .. }));

        let handle = chain.arborist();
        let arborist = handle.lock().await;
        assert_eq!(arborist.tree(tree).unwrap().start_index(), 2);
        assert!(arborist.link_node_balance(NODE) > U256::ZERO);

        drop(arborist);
        assert!(node.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_skips_drained_queue() {
        let (chain, tree) = setup(TriggerMode::BatchReady, U256::ZERO);
        let mut node = OracleNode::new(chain.clone(), MockProver::new(4, 2), NODE);
        assert_eq!(
            node.run_job(tree).await.unwrap(),
            JobOutcome::Skipped {
                tree,
                reason: ChainError::EmptyQueue
            }
        );
    }

    #[tokio::test]
    async fn test_second_node_finds_nothing_left() {
        let (chain, tree) = setup(TriggerMode::BatchReady, U256::ZERO);
        let mut first = OracleNode::new(chain.clone(), MockProver::new(4, 2), NODE);
        let other = Address::repeat_byte(0x0e);
        let mut second = OracleNode::new(chain.clone(), MockProver::new(4, 2), other);
        fill(&chain, tree).await;

        assert!(matches!(first.poll_once().await.unwrap()[0], JobOutcome::Submitted { .. }));
        assert!(matches!(
            second.poll_once().await.unwrap()[0],
            JobOutcome::Skipped { reason: ChainError::EmptyQueue, .. }
        ));
    }
}
