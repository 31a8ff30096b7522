use alloy::primitives::{keccak256, U256};
use tracing::debug;

use crate::domain::accumulator::Accumulator;
use crate::domain::circuit::{CircuitKind, MassUpdateInputs, SingleUpdateInputs};
use crate::domain::proof::Groth16Proof;
use crate::ports::prover::{Prover, ProverError};
use crate::ports::verifier::ProofVerifier;

/// Digest binding a mock proof to its circuit and public signals.
fn statement_digest(kind: CircuitKind, signals: &[U256]) -> U256 {
    let mut preimage = Vec::with_capacity(16 + signals.len() * 32);
    preimage.extend_from_slice(kind.name().as_bytes());
    for signal in signals {
        preimage.extend_from_slice(&signal.to_be_bytes::<32>());
    }
    U256::from_be_bytes(keccak256(&preimage).0)
}

/// Stand-in for a Groth16 verifier.
///
/// Accepts a proof only if it carries the digest of exactly these signals
/// and the signals satisfy the circuit relation. Not sound against a
/// malicious prover; the digest is public.
#[derive(Debug, Clone)]
pub struct MockVerifier {
    accumulator: Accumulator,
    batch_size: usize,
}

impl MockVerifier {
    pub fn new(depth: usize, batch_size: usize) -> Self {
        Self {
            accumulator: Accumulator::new(depth),
            batch_size,
        }
    }

    /// Produce a proof for `signals` without checking them.
    pub fn prove(&self, kind: CircuitKind, signals: &[U256]) -> Groth16Proof {
        let digest = statement_digest(kind, signals);
        Groth16Proof {
            a: [digest, U256::from(signals.len())],
            b: [[U256::ZERO; 2]; 2],
            c: [U256::ZERO; 2],
        }
    }

    fn statement_holds(&self, kind: CircuitKind, signals: &[U256]) -> bool {
        let depth = self.accumulator.depth();
        match kind {
            CircuitKind::SingleUpdate => SingleUpdateInputs::from_signals(depth, signals)
                .is_ok_and(|inputs| inputs.is_satisfied(&self.accumulator)),
            CircuitKind::MassUpdate => {
                MassUpdateInputs::from_signals(depth, self.batch_size, signals)
                    .is_ok_and(|inputs| inputs.is_satisfied(&self.accumulator))
            }
        }
    }
}

impl ProofVerifier for MockVerifier {
    fn verify(&self, kind: CircuitKind, signals: &[U256], proof: &Groth16Proof) -> bool {
        if proof != &self.prove(kind, signals) {
            debug!(%kind, "mock proof does not match signals");
            return false;
        }
        self.statement_holds(kind, signals)
    }
}

/// Prover paired with [`MockVerifier`]. Refuses unsatisfied statements the
/// way witness generation would.
#[derive(Debug, Clone)]
pub struct MockProver {
    verifier: MockVerifier,
}

impl MockProver {
    pub fn new(depth: usize, batch_size: usize) -> Self {
        Self {
            verifier: MockVerifier::new(depth, batch_size),
        }
    }

    /// A verifier that accepts this prover's proofs.
    pub fn verifier(&self) -> MockVerifier {
        self.verifier.clone()
    }

    fn prove_statement(
        &self,
        kind: CircuitKind,
        signals: &[U256],
    ) -> Result<Groth16Proof, ProverError> {
        if !self.verifier.statement_holds(kind, signals) {
            return Err(ProverError::WitnessError(format!(
                "{kind} constraints not satisfied"
            )));
        }
        Ok(self.verifier.prove(kind, signals))
    }
}

impl Prover for MockProver {
    async fn prove_single(&self, inputs: &SingleUpdateInputs) -> Result<Groth16Proof, ProverError> {
        self.prove_statement(CircuitKind::SingleUpdate, &inputs.to_signals())
    }

    async fn prove_mass(&self, inputs: &MassUpdateInputs) -> Result<Groth16Proof, ProverError> {
        self.prove_statement(CircuitKind::MassUpdate, &inputs.to_signals())
    }
}
