pub mod abi;
pub mod groth16_verifier;
pub mod local_chain;
pub mod memory_token;
pub mod mock_prover;
pub mod snarkjs_prover;
