use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy_primitives::utils::parse_units;
use serde::{Deserialize, Deserializer};

use crate::domain::accumulator::TREE_DEPTH;

/// Default batch size of cloned trees.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Oracle job id used by the reference deployment.
pub const DEFAULT_SPEC_ID: B256 = B256::new([
    0x0b, 0xad, 0xc0, 0xde, 0x0b, 0xad, 0xc0, 0xde, 0x0b, 0xad, 0xc0, 0xde, 0x0b, 0xad, 0xc0, 0xde,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
]);

/// 0.1 LINK.
pub const DEFAULT_PAYMENT: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

/// Parse a decimal LINK amount ("0.1") into base units (18 decimals).
pub fn parse_link(amount: &str) -> Result<U256, ConfigError> {
    parse_units(amount, 18u8)
        .map(Into::into)
        .map_err(|e| ConfigError::Validation(format!("invalid LINK amount {amount:?}: {e}")))
}

fn deserialize_link<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_link(&raw).map_err(serde::de::Error::custom)
}

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct VmTreeConfig {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub trigger: TriggerMode,
    pub node: Option<NodeConfig>,
    #[serde(default)]
    pub prover: ProverConfig,
    pub verifier: Option<VerifierConfig>,
}

/// Shape of every tree the orchestrator clones.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeConfig {
    pub depth: usize,
    pub batch_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: TREE_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// How a full queue is announced.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerMode {
    /// Paid oracle job request, gated on the payer's escrow.
    OracleRequest {
        spec_id: B256,
        #[serde(deserialize_with = "deserialize_link")]
        payment: U256,
    },
    /// Payment-free ready notification.
    BatchReady,
}

impl Default for TriggerMode {
    fn default() -> Self {
        TriggerMode::OracleRequest {
            spec_id: DEFAULT_SPEC_ID,
            payment: DEFAULT_PAYMENT,
        }
    }
}

impl TriggerMode {
    /// Amount a node earns per mass update.
    pub fn payment(&self) -> U256 {
        match self {
            TriggerMode::OracleRequest { payment, .. } => *payment,
            TriggerMode::BatchReady => U256::ZERO,
        }
    }
}

/// Oracle node settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Address credited for submitted updates.
    pub address: Address,
    /// Event polling interval (e.g. "500ms", "2s"). Parsed via humantime.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProverKind {
    #[default]
    Mock,
    Snarkjs,
}

/// Prover backend and circuit artifacts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub kind: ProverKind,
    pub snarkjs_bin: Option<PathBuf>,
    pub single_wasm: Option<PathBuf>,
    pub single_zkey: Option<PathBuf>,
    pub mass_wasm: Option<PathBuf>,
    pub mass_zkey: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
}

/// snarkjs verification keys. Absent means the mock verifier.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierConfig {
    pub single_vkey: PathBuf,
    pub mass_vkey: PathBuf,
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl VmTreeConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree.depth == 0 || self.tree.depth > 32 {
            return Err(ConfigError::Validation(format!(
                "tree.depth must be in 1..=32, got {}",
                self.tree.depth
            )));
        }
        if self.tree.batch_size == 0 {
            return Err(ConfigError::Validation("tree.batch_size must be positive".into()));
        }
        if (self.tree.batch_size as u64) > (1u64 << self.tree.depth) {
            return Err(ConfigError::Validation(
                "tree.batch_size cannot exceed the tree capacity".into(),
            ));
        }

        // snarkjs needs all four artifacts.
        if self.prover.kind == ProverKind::Snarkjs {
            let p = &self.prover;
            let missing: Vec<&str> = [
                ("single_wasm", &p.single_wasm),
                ("single_zkey", &p.single_zkey),
                ("mass_wasm", &p.mass_wasm),
                ("mass_zkey", &p.mass_zkey),
            ]
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect();
            if !missing.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "prover.kind = \"snarkjs\" requires {}",
                    missing.join(", ")
                )));
            }
            if self.verifier.is_none() {
                return Err(ConfigError::Validation(
                    "[verifier] keys are required with the snarkjs prover".into(),
                ));
            }
        }

        Ok(())
    }
}
