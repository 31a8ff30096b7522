use std::path::Path;

use alloy::primitives::U256;
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{BigInteger, PrimeField};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::circuit::CircuitKind;
use crate::domain::proof::Groth16Proof;
use crate::ports::verifier::ProofVerifier;

#[derive(Debug, thiserror::Error)]
pub enum VerifyingKeyError {
    #[error("failed to read verification key: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse verification key: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {0} in verification key")]
    InvalidPoint(&'static str),

    #[error("verification key is for {0}, expected groth16 over bn128")]
    Unsupported(String),
}

/// `verification_key.json` as exported by `snarkjs zkey export verificationkey`.
#[derive(Debug, Deserialize)]
struct SnarkjsVerifyingKey {
    protocol: String,
    curve: String,
    vk_alpha_1: Vec<String>,
    vk_beta_2: Vec<Vec<String>>,
    vk_gamma_2: Vec<Vec<String>>,
    vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    ic: Vec<Vec<String>>,
}

fn fq_from_word(word: U256) -> Option<Fq> {
    let value = Fq::from_be_bytes_mod_order(&word.to_be_bytes::<32>());
    (fq_to_word(value) == word).then_some(value)
}

fn fq_to_word(value: Fq) -> U256 {
    U256::from_be_slice(&value.into_bigint().to_bytes_be())
}

fn fr_from_signal(signal: U256) -> Option<Fr> {
    let value = Fr::from_be_bytes_mod_order(&signal.to_be_bytes::<32>());
    (U256::from_be_slice(&value.into_bigint().to_bytes_be()) == signal).then_some(value)
}

fn g1_from_words(x: U256, y: U256) -> Option<G1Affine> {
    if x.is_zero() && y.is_zero() {
        return Some(G1Affine::identity());
    }
    let point = G1Affine::new_unchecked(fq_from_word(x)?, fq_from_word(y)?);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then_some(point)
}

/// G2 point from `[c0, c1]` coordinate pairs.
fn g2_from_words(x: [U256; 2], y: [U256; 2]) -> Option<G2Affine> {
    if x.iter().chain(y.iter()).all(|w| w.is_zero()) {
        return Some(G2Affine::identity());
    }
    let point = G2Affine::new_unchecked(
        Fq2::new(fq_from_word(x[0])?, fq_from_word(x[1])?),
        Fq2::new(fq_from_word(y[0])?, fq_from_word(y[1])?),
    );
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then_some(point)
}

/// Proof points from calldata order (G2 `[c1, c0]`).
fn proof_to_ark(proof: &Groth16Proof) -> Option<Proof<Bn254>> {
    Some(Proof {
        a: g1_from_words(proof.a[0], proof.a[1])?,
        b: g2_from_words(
            [proof.b[0][1], proof.b[0][0]],
            [proof.b[1][1], proof.b[1][0]],
        )?,
        c: g1_from_words(proof.c[0], proof.c[1])?,
    })
}

/// Calldata-order proof from arkworks points.
pub fn proof_from_ark(proof: &Proof<Bn254>) -> Groth16Proof {
    Groth16Proof {
        a: [fq_to_word(proof.a.x), fq_to_word(proof.a.y)],
        b: [
            [fq_to_word(proof.b.x.c1), fq_to_word(proof.b.x.c0)],
            [fq_to_word(proof.b.y.c1), fq_to_word(proof.b.y.c0)],
        ],
        c: [fq_to_word(proof.c.x), fq_to_word(proof.c.y)],
    }
}

fn decimal(value: &str, what: &'static str) -> Result<U256, VerifyingKeyError> {
    value.parse::<U256>().map_err(|_| VerifyingKeyError::InvalidPoint(what))
}

fn parse_g1(coords: &[String], what: &'static str) -> Result<G1Affine, VerifyingKeyError> {
    let [x, y, ..] = coords else {
        return Err(VerifyingKeyError::InvalidPoint(what));
    };
    g1_from_words(decimal(x, what)?, decimal(y, what)?).ok_or(VerifyingKeyError::InvalidPoint(what))
}

fn parse_g2(coords: &[Vec<String>], what: &'static str) -> Result<G2Affine, VerifyingKeyError> {
    let [x, y, ..] = coords else {
        return Err(VerifyingKeyError::InvalidPoint(what));
    };
    let pair = |c: &[String]| -> Result<[U256; 2], VerifyingKeyError> {
        match c {
            [c0, c1, ..] => Ok([decimal(c0, what)?, decimal(c1, what)?]),
            _ => Err(VerifyingKeyError::InvalidPoint(what)),
        }
    };
    g2_from_words(pair(x)?, pair(y)?).ok_or(VerifyingKeyError::InvalidPoint(what))
}

/// Parse a snarkjs Groth16 verification key.
pub fn parse_snarkjs_vkey(json: &str) -> Result<VerifyingKey<Bn254>, VerifyingKeyError> {
    let raw: SnarkjsVerifyingKey = serde_json::from_str(json)?;
    if raw.protocol != "groth16" || raw.curve != "bn128" {
        return Err(VerifyingKeyError::Unsupported(format!("{} over {}", raw.protocol, raw.curve)));
    }
    Ok(VerifyingKey {
        alpha_g1: parse_g1(&raw.vk_alpha_1, "vk_alpha_1")?,
        beta_g2: parse_g2(&raw.vk_beta_2, "vk_beta_2")?,
        gamma_g2: parse_g2(&raw.vk_gamma_2, "vk_gamma_2")?,
        delta_g2: parse_g2(&raw.vk_delta_2, "vk_delta_2")?,
        gamma_abc_g1: raw
            .ic
            .iter()
            .map(|p| parse_g1(p, "IC"))
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Groth16 pairing check over BN254, one key per circuit.
pub struct Groth16Verifier {
    single: PreparedVerifyingKey<Bn254>,
    mass: PreparedVerifyingKey<Bn254>,
}

impl Groth16Verifier {
    pub fn new(single: &VerifyingKey<Bn254>, mass: &VerifyingKey<Bn254>) -> Self {
        Self {
            single: prepare_verifying_key(single),
            mass: prepare_verifying_key(mass),
        }
    }

    /// Load both keys from snarkjs `verification_key.json` files.
    pub fn from_snarkjs_files(single: &Path, mass: &Path) -> Result<Self, VerifyingKeyError> {
        let single = parse_snarkjs_vkey(&std::fs::read_to_string(single)?)?;
        let mass = parse_snarkjs_vkey(&std::fs::read_to_string(mass)?)?;
        Ok(Self::new(&single, &mass))
    }

    fn key(&self, kind: CircuitKind) -> &PreparedVerifyingKey<Bn254> {
        match kind {
            CircuitKind::SingleUpdate => &self.single,
            CircuitKind::MassUpdate => &self.mass,
        }
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, kind: CircuitKind, signals: &[U256], proof: &Groth16Proof) -> bool {
        let pvk = self.key(kind);
        if pvk.vk.gamma_abc_g1.len() != signals.len() + 1 {
            warn!(%kind, signals = signals.len(), "public signal count does not match key");
            return false;
        }
        let inputs = signals.iter().map(|s| fr_from_signal(*s));
        let Some(inputs) = inputs.collect::<Option<Vec<_>>>() else {
            debug!(%kind, "public signal outside the scalar field");
            return false;
        };
        let Some(proof) = proof_to_ark(proof) else {
            debug!(%kind, "proof point not on curve");
            return false;
        };
        match Groth16::<Bn254>::verify_proof(pvk, &proof, &inputs) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(%kind, error = %e, "groth16 verification errored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::Zero;
    use ark_relations::lc;
    use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError, Variable};
    use ark_snark::SNARK;

    /// Exposes each value as a public input bound to an equal witness.
    #[derive(Clone)]
    struct EchoCircuit {
        values: Vec<Fr>,
    }

    impl ConstraintSynthesizer<Fr> for EchoCircuit {
        fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
            for value in self.values {
                let public = cs.new_input_variable(|| Ok(value))?;
                let private = cs.new_witness_variable(|| Ok(value))?;
                cs.enforce_constraint(lc!() + private, lc!() + Variable::One, lc!() + public)?;
            }
            Ok(())
        }
    }

    fn signals() -> Vec<U256> {
        vec![U256::from(3), U256::from(1) << 200, U256::from(42), U256::ZERO]
    }

    fn setup() -> (VerifyingKey<Bn254>, Groth16Proof) {
        use ark_std::rand::SeedableRng;
        // Same deterministic seed as `ark_std::test_rng()`, but as the concrete
        // `StdRng` so the `CryptoRng` bound required by Groth16 is satisfied.
        let mut rng = ark_std::rand::rngs::StdRng::from_seed([
            1, 0, 0, 0, 23, 0, 0, 0, 200, 1, 0, 0, 210, 30, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0,
        ]);
        let values: Vec<Fr> = signals().iter().map(|s| fr_from_signal(*s).unwrap()).collect();
        let blank = EchoCircuit { values: vec![Fr::zero(); values.len()] };
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(blank, &mut rng).unwrap();
        let proof = Groth16::<Bn254>::prove(&pk, EchoCircuit { values }, &mut rng).unwrap();
        (vk, proof_from_ark(&proof))
    }

    fn g1_json(p: &G1Affine) -> String {
        format!("[\"{}\", \"{}\", \"1\"]", fq_to_word(p.x), fq_to_word(p.y))
    }

    fn g2_json(p: &G2Affine) -> String {
        format!(
            "[[\"{}\", \"{}\"], [\"{}\", \"{}\"], [\"1\", \"0\"]]",
            fq_to_word(p.x.c0),
            fq_to_word(p.x.c1),
            fq_to_word(p.y.c0),
            fq_to_word(p.y.c1)
        )
    }

    fn vk_json(vk: &VerifyingKey<Bn254>) -> String {
        let ic: Vec<String> = vk.gamma_abc_g1.iter().map(g1_json).collect();
        format!(
            r#"{{"protocol": "groth16", "curve": "bn128", "nPublic": {},
                "vk_alpha_1": {}, "vk_beta_2": {}, "vk_gamma_2": {}, "vk_delta_2": {},
                "IC": [{}]}}"#,
            ic.len() - 1,
            g1_json(&vk.alpha_g1),
            g2_json(&vk.beta_g2),
            g2_json(&vk.gamma_g2),
            g2_json(&vk.delta_g2),
            ic.join(", ")
        )
    }

    #[test]
    fn test_verifies_arkworks_proof() {
        let (vk, proof) = setup();
        let verifier = Groth16Verifier::new(&vk, &vk);
        assert!(verifier.verify(CircuitKind::SingleUpdate, &signals(), &proof));
    }

    #[test]
    fn test_rejects_tampered_signal() {
        let (vk, proof) = setup();
        let verifier = Groth16Verifier::new(&vk, &vk);
        let mut tampered = signals();
        tampered[2] = U256::from(43);
        assert!(!verifier.verify(CircuitKind::SingleUpdate, &tampered, &proof));
    }

    #[test]
    fn test_rejects_wrong_signal_count() {
        let (vk, proof) = setup();
        let verifier = Groth16Verifier::new(&vk, &vk);
        assert!(!verifier.verify(CircuitKind::MassUpdate, &signals()[..3], &proof));
    }

    #[test]
    fn test_rejects_off_curve_proof() {
        let (vk, mut proof) = setup();
        let verifier = Groth16Verifier::new(&vk, &vk);
        proof.a[1] += U256::from(1);
        assert!(!verifier.verify(CircuitKind::SingleUpdate, &signals(), &proof));
    }

    #[test]
    fn test_rejects_signal_above_modulus() {
        let (vk, proof) = setup();
        let verifier = Groth16Verifier::new(&vk, &vk);
        let mut huge = signals();
        huge[0] = U256::MAX;
        assert!(!verifier.verify(CircuitKind::SingleUpdate, &huge, &proof));
    }

    #[test]
    fn test_parse_snarkjs_vkey() {
        let (vk, proof) = setup();
        let parsed = parse_snarkjs_vkey(&vk_json(&vk)).unwrap();
        assert_eq!(parsed, vk);

        let verifier = Groth16Verifier::new(&parsed, &parsed);
        assert!(verifier.verify(CircuitKind::SingleUpdate, &signals(), &proof));
    }

    #[test]
    fn test_parse_rejects_plonk_key() {
        let (vk, _) = setup();
        let json = vk_json(&vk).replace("groth16", "plonk");
        assert!(matches!(
            parse_snarkjs_vkey(&json),
            Err(VerifyingKeyError::Unsupported(_))
        ));
    }
}
