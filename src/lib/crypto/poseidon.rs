use alloy_primitives::{keccak256, B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, UniformRand};
use ark_std::rand::RngCore;
use light_poseidon::{Poseidon, PoseidonHasher};

/// Seed of the empty-leaf value: `keccak256("vmtree") mod p`.
pub const ZERO_VALUE_SEED: &[u8] = b"vmtree";

/// Convert B256 to BN254 field element (reduced mod p).
pub fn b256_to_fr(value: B256) -> Fr {
    Fr::from_be_bytes_mod_order(value.as_ref())
}

/// Convert BN254 field element to B256.
pub fn fr_to_b256(value: Fr) -> B256 {
    let bytes = value.into_bigint().to_bytes_be();
    B256::left_padding_from(&bytes)
}

/// The BN254 scalar field modulus as a 256-bit integer.
pub fn field_modulus() -> U256 {
    U256::from_be_slice(&Fr::MODULUS.to_bytes_be())
}

/// Whether `value` is a canonical field element (strictly below the modulus).
pub fn is_canonical(value: B256) -> bool {
    U256::from_be_bytes(value.0) < field_modulus()
}

/// Value of an empty leaf. Doubles as the padding sentinel of mass updates.
pub fn zero_value() -> B256 {
    fr_to_b256(Fr::from_be_bytes_mod_order(keccak256(ZERO_VALUE_SEED).as_slice()))
}

/// Poseidon hash with 2 inputs (Merkle node compression).
pub fn poseidon2(a: B256, b: B256) -> B256 {
    let mut hasher = Poseidon::<Fr>::new_circom(2).expect("Failed to create Poseidon hasher");
    let result = hasher
        .hash(&[b256_to_fr(a), b256_to_fr(b)])
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Uniformly random leaf that is safe to commit (canonical, never the sentinel).
///
/// Not suitable for real commitments: there is no hiding or binding here.
pub fn random_leaf<R: RngCore>(rng: &mut R) -> B256 {
    let sentinel = zero_value();
    loop {
        let leaf = fr_to_b256(Fr::rand(rng));
        if leaf != sentinel {
            return leaf;
        }
    }
}

/// `n` random leaves, see [`random_leaf`].
pub fn random_leaves<R: RngCore>(rng: &mut R, n: usize) -> Vec<B256> {
    (0..n).map(|_| random_leaf(rng)).collect()
}
