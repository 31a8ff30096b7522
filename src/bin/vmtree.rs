//! VMTree command-line tools.
//!
//! Run with:
//!   cargo run --bin vmtree -- zeros --depth 20
//!   cargo run --bin vmtree -- random-leaves --count 10 --seed 7
//!   cargo run --bin vmtree -- frontier --depth 20 0x01 0x02
//!   cargo run --bin vmtree -- simulate --config vmtree.toml --batches 3

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, B256, U256};
use anyhow::{bail, Context, Result};
use ark_std::rand::rngs::StdRng;
use ark_std::rand::SeedableRng;
use clap::{Parser, Subcommand};
use tracing::info;

use vmtree::adapters::groth16_verifier::Groth16Verifier;
use vmtree::adapters::local_chain::LocalChain;
use vmtree::adapters::memory_token::{link_total_supply, MemoryLinkToken};
use vmtree::adapters::mock_prover::MockProver;
use vmtree::adapters::snarkjs_prover::{CircuitArtifacts, SnarkjsProver};
use vmtree::arborist::{Arborist, ArboristSettings};
use vmtree::config::{parse_link, ProverConfig, ProverKind, VmTreeConfig};
use vmtree::crypto::poseidon::{is_canonical, random_leaves, zero_value};
use vmtree::domain::accumulator::{Accumulator, TREE_DEPTH};
use vmtree::node::{JobOutcome, OracleNode};
use vmtree::ports::prover::Prover;
use vmtree::ports::verifier::ProofVerifier;

const ARBORIST: Address = Address::new([0xab; 20]);
const LINK: Address = Address::new([0x1c; 20]);
const PAYER: Address = Address::new([0xaa; 20]);
const DEFAULT_NODE: Address = Address::new([0x0d; 20]);

#[derive(Parser)]
#[command(name = "vmtree", about = "VMTree accumulator and oracle tooling")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the zero value of every level.
    Zeros {
        #[arg(long, default_value_t = TREE_DEPTH)]
        depth: usize,
    },
    /// Generate random committable leaves.
    RandomLeaves {
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Insert leaves into an empty tree and print its frontier and root.
    Frontier {
        #[arg(long, default_value_t = TREE_DEPTH)]
        depth: usize,
        /// Leaves as 0x-prefixed hex or decimal field elements.
        leaves: Vec<String>,
    },
    /// Run funded batches through an in-process ledger and oracle node.
    Simulate {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "./vmtree.toml")]
        config: PathBuf,
        #[arg(long, default_value_t = 2)]
        batches: usize,
        /// Initial escrow in LINK.
        #[arg(long, default_value = "1")]
        funding: String,
    },
}

fn parse_leaf(raw: &str) -> Result<B256> {
    let value: U256 = raw.parse().with_context(|| format!("invalid leaf {raw:?}"))?;
    let leaf = B256::from(value.to_be_bytes::<32>());
    if !is_canonical(leaf) || leaf == zero_value() {
        bail!("leaf {raw} is not committable");
    }
    Ok(leaf)
}

/// Depths the accumulator supports: a leaf index must fit in a `u64`.
fn accumulator(depth: usize) -> Result<Accumulator> {
    if depth == 0 || depth >= 64 {
        bail!("--depth must be in 1..=63, got {depth}");
    }
    Ok(Accumulator::new(depth))
}

fn link(amount: U256) -> String {
    format_units(amount, 18u8).unwrap_or_else(|_| amount.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Args::parse().command {
        Command::Zeros { depth } => {
            let acc = accumulator(depth)?;
            for (level, zero) in acc.zeros().iter().enumerate() {
                println!("{level:>2} {zero}");
            }
        }
        Command::RandomLeaves { count, seed } => {
            let seed = seed.unwrap_or_else(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos() as u64)
            });
            let mut rng = StdRng::seed_from_u64(seed);
            for leaf in random_leaves(&mut rng, count) {
                println!("{leaf}");
            }
        }
        Command::Frontier { depth, leaves } => {
            let acc = accumulator(depth)?;
            let leaves = leaves
                .iter()
                .map(|raw| parse_leaf(raw))
                .collect::<Result<Vec<_>>>()?;
            if leaves.len() as u64 > acc.capacity() {
                bail!(
                    "{} leaves exceed the capacity {} of a depth-{depth} tree",
                    leaves.len(),
                    acc.capacity()
                );
            }
            let transition = acc.frontier_from_leaves(&leaves);
            let out = serde_json::json!({
                "leafCount": leaves.len(),
                "root": transition.root,
                "filledSubtrees": transition.frontier,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Simulate {
            config,
            batches,
            funding,
        } => {
            let config = VmTreeConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let funding = parse_link(&funding)?;
            match config.prover.kind {
                ProverKind::Mock => {
                    let prover = MockProver::new(config.tree.depth, config.tree.batch_size);
                    let verifier = prover.verifier();
                    simulate(&config, prover, verifier, batches, funding).await?;
                }
                ProverKind::Snarkjs => {
                    let keys = config.verifier.as_ref().context("missing [verifier] section")?;
                    let verifier =
                        Groth16Verifier::from_snarkjs_files(&keys.single_vkey, &keys.mass_vkey)?;
                    let prover = snarkjs_prover(&config.prover)?;
                    simulate(&config, prover, verifier, batches, funding).await?;
                }
            }
        }
    }
    Ok(())
}

fn snarkjs_prover(config: &ProverConfig) -> Result<SnarkjsProver> {
    let artifacts = |wasm: &Option<PathBuf>, zkey: &Option<PathBuf>| -> Result<CircuitArtifacts> {
        Ok(CircuitArtifacts {
            wasm: wasm.clone().context("missing wasm path")?,
            zkey: zkey.clone().context("missing zkey path")?,
        })
    };
    Ok(SnarkjsProver::new(
        config.snarkjs_bin.clone().unwrap_or_else(|| PathBuf::from("snarkjs")),
        artifacts(&config.single_wasm, &config.single_zkey)?,
        artifacts(&config.mass_wasm, &config.mass_zkey)?,
        config.work_dir.clone().unwrap_or_else(std::env::temp_dir),
    ))
}

async fn simulate<P, V>(
    config: &VmTreeConfig,
    prover: P,
    verifier: V,
    batches: usize,
    funding: U256,
) -> Result<()>
where
    P: Prover,
    V: ProofVerifier + Send,
{
    let node_address = config.node.as_ref().map_or(DEFAULT_NODE, |n| n.address);
    let token = MemoryLinkToken::new(LINK, PAYER, link_total_supply());
    let settings = ArboristSettings::from(config);
    let chain = LocalChain::new(Arborist::new(ARBORIST, token, verifier, settings));
    let handle = chain.arborist();
    let mut node = OracleNode::new(chain.clone(), prover, node_address);

    let tree = handle.lock().await.transfer_and_call(PAYER, funding, &[])?;
    info!(%tree, funding = %link(funding), "tree funded");

    let mut rng = ark_std::test_rng();
    for batch in 0..batches {
        {
            let mut arborist = handle.lock().await;
            for leaf in random_leaves(&mut rng, config.tree.batch_size) {
                arborist.commit(tree, leaf)?;
            }
        }
        for outcome in node.poll_once().await? {
            match outcome {
                JobOutcome::Submitted {
                    consumed, tx_hash, ..
                } => info!(batch, consumed, %tx_hash, "batch settled"),
                other => info!(batch, ?other, "batch not settled"),
            }
        }
    }

    let arborist = handle.lock().await;
    let t = arborist.tree(tree).context("tree vanished")?;
    println!("tree:          {tree}");
    println!("inserted:      {}", t.start_index());
    println!("pending:       {}", t.pending().len());
    println!("root:          {}", t.root());
    println!("payer balance: {} LINK", link(arborist.link_payer_balance(PAYER)));
    println!("node balance:  {} LINK", link(arborist.link_node_balance(node_address)));
    Ok(())
}
