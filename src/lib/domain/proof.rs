use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Groth16 proof in Solidity verifier calldata order.
///
/// G2 coordinates are `[c1, c0]` (imaginary part first), as produced by
/// `snarkjs zkey export soliditycalldata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
}

/// `proof.json` as written by `snarkjs groth16 prove`. Decimal strings,
/// projective coordinates, G2 in `[c0, c1]` order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnarkjsProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub curve: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProofFormatError {
    #[error("missing coordinate in {0}")]
    MissingCoordinate(&'static str),

    #[error("invalid decimal in {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unsupported protocol {0}")]
    UnsupportedProtocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn parse_decimal(field: &'static str, value: &str) -> Result<U256, ProofFormatError> {
    value.parse::<U256>().map_err(|_| ProofFormatError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn coordinate<'a, T>(
    items: &'a [T],
    i: usize,
    field: &'static str,
) -> Result<&'a T, ProofFormatError> {
    items.get(i).ok_or(ProofFormatError::MissingCoordinate(field))
}

impl Groth16Proof {
    /// Flatten to the 8 calldata words `[a0, a1, b00, b01, b10, b11, c0, c1]`.
    pub fn to_flat(&self) -> [U256; 8] {
        [
            self.a[0],
            self.a[1],
            self.b[0][0],
            self.b[0][1],
            self.b[1][0],
            self.b[1][1],
            self.c[0],
            self.c[1],
        ]
    }

    pub fn from_flat(words: [U256; 8]) -> Self {
        Self {
            a: [words[0], words[1]],
            b: [[words[2], words[3]], [words[4], words[5]]],
            c: [words[6], words[7]],
        }
    }

    /// Convert a snarkjs proof, swapping G2 coordinates into calldata order.
    pub fn from_snarkjs(proof: &SnarkjsProof) -> Result<Self, ProofFormatError> {
        if let Some(protocol) = &proof.protocol {
            if protocol != "groth16" {
                return Err(ProofFormatError::UnsupportedProtocol(protocol.clone()));
            }
        }
        let g1 = |point: &[String], field: &'static str| -> Result<[U256; 2], ProofFormatError> {
            Ok([
                parse_decimal(field, coordinate(point, 0, field)?)?,
                parse_decimal(field, coordinate(point, 1, field)?)?,
            ])
        };
        let g2_row = |i: usize| -> Result<[U256; 2], ProofFormatError> {
            let row = coordinate(&proof.pi_b, i, "pi_b")?;
            Ok([
                parse_decimal("pi_b", coordinate(row, 1, "pi_b")?)?,
                parse_decimal("pi_b", coordinate(row, 0, "pi_b")?)?,
            ])
        };
        Ok(Self {
            a: g1(&proof.pi_a, "pi_a")?,
            b: [g2_row(0)?, g2_row(1)?],
            c: g1(&proof.pi_c, "pi_c")?,
        })
    }

    pub fn from_snarkjs_json(json: &str) -> Result<Self, ProofFormatError> {
        let proof: SnarkjsProof = serde_json::from_str(json)?;
        Self::from_snarkjs(&proof)
    }
}
