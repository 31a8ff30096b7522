use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{B256, U256};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::circuit::{CircuitKind, MassUpdateInputs, SingleUpdateInputs};
use crate::domain::proof::Groth16Proof;
use crate::ports::prover::{Prover, ProverError};

/// Format a field element as the decimal string circom expects.
fn format_field(value: &B256) -> String {
    U256::from_be_bytes(value.0).to_string()
}

fn format_fields(values: &[B256]) -> Vec<String> {
    values.iter().map(format_field).collect()
}

/// `input.json` of the single update circuit. Names match the circom signals.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SingleUpdateInput {
    start_index: String,
    leaf: String,
    prior_subtrees: Vec<String>,
    new_subtrees: Vec<String>,
}

impl From<&SingleUpdateInputs> for SingleUpdateInput {
    fn from(inputs: &SingleUpdateInputs) -> Self {
        Self {
            start_index: inputs.start_index.to_string(),
            leaf: format_field(&inputs.leaf),
            prior_subtrees: format_fields(&inputs.prior_frontier),
            new_subtrees: format_fields(&inputs.new_frontier),
        }
    }
}

/// `input.json` of the mass update circuit.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MassUpdateInput {
    start_index: String,
    leaves: Vec<String>,
    prior_subtrees: Vec<String>,
    new_subtrees: Vec<String>,
    new_root: String,
}

impl From<&MassUpdateInputs> for MassUpdateInput {
    fn from(inputs: &MassUpdateInputs) -> Self {
        Self {
            start_index: inputs.start_index.to_string(),
            leaves: format_fields(&inputs.leaves),
            prior_subtrees: format_fields(&inputs.prior_frontier),
            new_subtrees: format_fields(&inputs.new_frontier),
            new_root: format_field(&inputs.new_root),
        }
    }
}

/// Compiled circuit: witness generator and proving key.
#[derive(Debug, Clone)]
pub struct CircuitArtifacts {
    pub wasm: PathBuf,
    pub zkey: PathBuf,
}

/// SnarkjsProver generates Groth16 proofs by shelling out to snarkjs.
///
/// For each proof it:
/// 1. Writes `input.json` into a fresh work directory
/// 2. Runs `snarkjs groth16 fullprove` (witness + proof)
/// 3. Reads `proof.json` and checks `public.json` against the expected signals
pub struct SnarkjsProver {
    snarkjs_bin: PathBuf,
    single: CircuitArtifacts,
    mass: CircuitArtifacts,
    work_dir: PathBuf,
    counter: AtomicU64,
}

impl SnarkjsProver {
    pub fn new(
        snarkjs_bin: PathBuf,
        single: CircuitArtifacts,
        mass: CircuitArtifacts,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            snarkjs_bin,
            single,
            mass,
            work_dir,
            counter: AtomicU64::new(0),
        }
    }

    fn artifacts(&self, kind: CircuitKind) -> &CircuitArtifacts {
        match kind {
            CircuitKind::SingleUpdate => &self.single,
            CircuitKind::MassUpdate => &self.mass,
        }
    }

    fn job_dir(&self, kind: CircuitKind) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.work_dir.join(format!("{}-{}-{n}", kind.name(), std::process::id()))
    }

    async fn prove_circuit(
        &self,
        kind: CircuitKind,
        input_json: String,
        expected_signals: &[U256],
    ) -> Result<Groth16Proof, ProverError> {
        let artifacts = self.artifacts(kind);
        for path in [&artifacts.wasm, &artifacts.zkey] {
            if !path.exists() {
                return Err(ProverError::ArtifactNotFound(path.display().to_string()));
            }
        }

        let dir = self.job_dir(kind);
        tokio::fs::create_dir_all(&dir).await?;
        let input_path = dir.join("input.json");
        let proof_path = dir.join("proof.json");
        let public_path = dir.join("public.json");

        // 1. Write input.json
        tokio::fs::write(&input_path, input_json).await?;

        // 2. Witness + proof
        debug!(%kind, dir = %dir.display(), "running snarkjs groth16 fullprove");
        let output = Command::new(&self.snarkjs_bin)
            .args(["groth16", "fullprove"])
            .arg(&input_path)
            .arg(&artifacts.wasm)
            .arg(&artifacts.zkey)
            .arg(&proof_path)
            .arg(&public_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProverError::ProofFailed(format!(
                "snarkjs groth16 fullprove failed: {stderr}"
            )));
        }

        // 3. Read outputs
        let proof_json = tokio::fs::read_to_string(&proof_path).await?;
        let proof = Groth16Proof::from_snarkjs_json(&proof_json)
            .map_err(|e| ProverError::MalformedOutput(e.to_string()))?;
        let public = read_public_signals(&public_path).await?;
        if public != expected_signals {
            return Err(ProverError::MalformedOutput(format!(
                "public.json has {} signals that do not match the expected {}",
                public.len(),
                expected_signals.len()
            )));
        }

        let _ = tokio::fs::remove_dir_all(&dir).await;
        info!(%kind, "proof generated");
        Ok(proof)
    }
}

async fn read_public_signals(path: &Path) -> Result<Vec<U256>, ProverError> {
    let content = tokio::fs::read_to_string(path).await?;
    let raw: Vec<String> = serde_json::from_str(&content)
        .map_err(|e| ProverError::MalformedOutput(format!("public.json: {e}")))?;
    raw.iter()
        .map(|s| {
            s.parse::<U256>()
                .map_err(|_| ProverError::MalformedOutput(format!("public.json: bad signal {s}")))
        })
        .collect()
}

impl Prover for SnarkjsProver {
    async fn prove_single(&self, inputs: &SingleUpdateInputs) -> Result<Groth16Proof, ProverError> {
        let input = serde_json::to_string(&SingleUpdateInput::from(inputs))
            .map_err(|e| ProverError::WitnessSerialization(e.to_string()))?;
        self.prove_circuit(CircuitKind::SingleUpdate, input, &inputs.to_signals())
            .await
    }

    async fn prove_mass(&self, inputs: &MassUpdateInputs) -> Result<Groth16Proof, ProverError> {
        let input = serde_json::to_string(&MassUpdateInput::from(inputs))
            .map_err(|e| ProverError::WitnessSerialization(e.to_string()))?;
        self.prove_circuit(CircuitKind::MassUpdate, input, &inputs.to_signals())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accumulator::Accumulator;

    fn mass_inputs() -> MassUpdateInputs {
        let acc = Accumulator::new(3);
        let leaves = vec![B256::left_padding_from(&[1]), B256::left_padding_from(&[2])];
        MassUpdateInputs::derive(&acc, 4, 0, &leaves, &acc.initial_frontier()).unwrap()
    }

    #[test]
    fn test_mass_input_json_shape() {
        let inputs = mass_inputs();
        let json = serde_json::to_value(MassUpdateInput::from(&inputs)).unwrap();

        assert_eq!(json["startIndex"], "0");
        assert_eq!(json["leaves"].as_array().unwrap().len(), 4);
        assert_eq!(json["leaves"][0], "1");
        assert_eq!(json["priorSubtrees"].as_array().unwrap().len(), 3);
        assert_eq!(json["newSubtrees"].as_array().unwrap().len(), 3);
        assert_eq!(
            json["newRoot"],
            U256::from_be_bytes(inputs.new_root.0).to_string()
        );
    }

    #[test]
    fn test_single_input_json_shape() {
        let acc = Accumulator::new(2);
        let inputs = SingleUpdateInputs::derive(
            &acc,
            0,
            B256::left_padding_from(&[7]),
            &acc.initial_frontier(),
        );
        let json = serde_json::to_value(SingleUpdateInput::from(&inputs)).unwrap();
        assert_eq!(json["leaf"], "7");
        assert_eq!(json["newSubtrees"][0], "7");
    }

    #[tokio::test]
    async fn test_missing_artifacts() {
        let missing = CircuitArtifacts {
            wasm: PathBuf::from("/nonexistent/mass.wasm"),
            zkey: PathBuf::from("/nonexistent/mass.zkey"),
        };
        let prover = SnarkjsProver::new(
            PathBuf::from("snarkjs"),
            missing.clone(),
            missing,
            std::env::temp_dir(),
        );
        assert!(matches!(
            prover.prove_mass(&mass_inputs()).await,
            Err(ProverError::ArtifactNotFound(_))
        ));
    }

    /// Requires snarkjs on PATH and compiled circuits under `circuits/build/`.
    #[tokio::test]
    #[ignore]
    async fn test_snarkjs_mass_proof() {
        let build = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("circuits/build");
        let artifacts = |name: &str| CircuitArtifacts {
            wasm: build.join(format!("{name}_js/{name}.wasm")),
            zkey: build.join(format!("{name}.zkey")),
        };
        let prover = SnarkjsProver::new(
            PathBuf::from("snarkjs"),
            artifacts("update"),
            artifacts("mass_update"),
            std::env::temp_dir(),
        );
        let proof = prover.prove_mass(&mass_inputs()).await.unwrap();
        assert_ne!(proof.a[0], U256::ZERO);
    }
}
