//! VMTree: frontier-only Merkle accumulator whose batch updates are gated on
//! zk proofs, plus the Arborist escrow that pays oracle nodes for them.

pub mod adapters;
pub mod arborist;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod node;
pub mod ports;
pub mod tree;
