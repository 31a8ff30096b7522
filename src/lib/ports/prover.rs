use std::future::Future;

use crate::domain::circuit::{MassUpdateInputs, SingleUpdateInputs};
use crate::domain::proof::Groth16Proof;

/// Port for zk proof generation.
///
/// Implementations:
/// - `SnarkjsProver` (shells out to `snarkjs groth16 fullprove`)
/// - `MockProver` for testing
pub trait Prover: Send + Sync {
    /// Prove a single-leaf frontier update.
    fn prove_single(
        &self,
        inputs: &SingleUpdateInputs,
    ) -> impl Future<Output = Result<Groth16Proof, ProverError>> + Send;

    /// Prove a batch update. `inputs.leaves` is already padded to the circuit
    /// batch size.
    fn prove_mass(
        &self,
        inputs: &MassUpdateInputs,
    ) -> impl Future<Output = Result<Groth16Proof, ProverError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    #[error("proof generation failed: {0}")]
    ProofFailed(String),

    #[error("witness generation failed: {0}")]
    WitnessError(String),

    #[error("witness serialization error: {0}")]
    WitnessSerialization(String),

    #[error("circuit artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("malformed proof output: {0}")]
    MalformedOutput(String),
}
