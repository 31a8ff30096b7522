use alloy::primitives::U256;

use crate::domain::circuit::CircuitKind;
use crate::domain::proof::Groth16Proof;

/// Port for zk proof verification.
///
/// Verification is a pure predicate: a rejected or malformed proof is `false`,
/// never an error, and the caller decides how to fail.
///
/// Implementations:
/// - `Groth16Verifier` (arkworks pairing check against snarkjs verification keys)
/// - `MockVerifier` (re-executes the statement, for tests and demos)
pub trait ProofVerifier {
    fn verify(&self, kind: CircuitKind, signals: &[U256], proof: &Groth16Proof) -> bool;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for &V {
    fn verify(&self, kind: CircuitKind, signals: &[U256], proof: &Groth16Proof) -> bool {
        (**self).verify(kind, signals, proof)
    }
}
