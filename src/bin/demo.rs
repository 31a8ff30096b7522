//! VMTree + Arborist demo
//!
//! Runs the reference scenario in-process: a depth-20 tree with batch size
//! 10, paid oracle requests of 0.1 LINK, a mock prover and an oracle node
//! polling a local ledger.
//!
//! Run with: `cargo run --bin demo`

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};

use vmtree::adapters::local_chain::LocalChain;
use vmtree::adapters::memory_token::{link_total_supply, MemoryLinkToken, ONE_LINK};
use vmtree::adapters::mock_prover::MockProver;
use vmtree::arborist::{Arborist, ArboristError, ArboristSettings};
use vmtree::config::{TriggerMode, DEFAULT_BATCH_SIZE, DEFAULT_PAYMENT, DEFAULT_SPEC_ID};
use vmtree::crypto::poseidon::random_leaves;
use vmtree::domain::accumulator::TREE_DEPTH;
use vmtree::domain::payload::{encode_deploy, DEFAULT_TREE_NAME};
use vmtree::node::{JobOutcome, OracleNode};
use vmtree::ports::token::LinkToken;
use vmtree::tree::{TreeError, TriggerOutcome};

const ARBORIST: Address = Address::new([0xab; 20]);
const LINK: Address = Address::new([0x1c; 20]);
const PAYER: Address = Address::new([0xaa; 20]);
const NODE: Address = Address::new([0x0d; 20]);

fn link(amount: U256) -> String {
    format_units(amount, 18u8).unwrap_or_else(|_| amount.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("=== VMTree: zk-verified batch updates paid in LINK ===\n");

    // ── Setup ──
    let prover = MockProver::new(TREE_DEPTH, DEFAULT_BATCH_SIZE);
    let token = MemoryLinkToken::new(LINK, PAYER, link_total_supply());
    let settings = ArboristSettings {
        depth: TREE_DEPTH,
        batch_size: DEFAULT_BATCH_SIZE,
        trigger: TriggerMode::OracleRequest {
            spec_id: DEFAULT_SPEC_ID,
            payment: DEFAULT_PAYMENT,
        },
    };
    let chain = LocalChain::new(Arborist::new(ARBORIST, token, prover.verifier(), settings));
    let handle = chain.arborist();
    let mut node = OracleNode::new(chain.clone(), prover, NODE);

    // ── Phase 1: fund and clone ──
    println!("[1] Funding a tree with 0.1 LINK via transferAndCall");
    let data = encode_deploy(PAYER, DEFAULT_TREE_NAME);
    let tree = handle.lock().await.transfer_and_call(PAYER, DEFAULT_PAYMENT, &data)?;
    println!("  tree:          {tree}");
    println!("  payer balance: {} LINK", link(handle.lock().await.link_payer_balance(PAYER)));

    // ── Phase 2: fill the queue ──
    println!("\n[2] Committing {DEFAULT_BATCH_SIZE} leaves");
    let mut rng = ark_std::test_rng();
    let leaves = random_leaves(&mut rng, 2 * DEFAULT_BATCH_SIZE);
    {
        let mut arborist = handle.lock().await;
        for leaf in &leaves[..DEFAULT_BATCH_SIZE - 1] {
            arborist.commit(tree, *leaf)?;
        }
        let pending = arborist.tree(tree).context("tree vanished")?.pending().len();
        println!("  after 9 commits: {pending} pending, no trigger");

        let receipt = arborist.commit(tree, leaves[DEFAULT_BATCH_SIZE - 1])?;
        match receipt.trigger {
            Some(TriggerOutcome::Requested { request_id }) => {
                let short = &hex::encode(request_id.0)[..16];
                println!("  10th commit:     oracle request 0x{short}... (epoch 0)");
            }
            other => bail!("expected an oracle request, got {other:?}"),
        }
    }

    // ── Phase 3: oracle node proves and settles ──
    println!("\n[3] Oracle node polls, proves and submits");
    for outcome in node.poll_once().await? {
        if let JobOutcome::Submitted { consumed, tx_hash, .. } = outcome {
            println!("  submitted {consumed} leaves in tx {tx_hash}");
        }
    }
    {
        let arborist = handle.lock().await;
        let t = arborist.tree(tree).context("tree vanished")?;
        let expected = t.accumulator().frontier_from_leaves(&leaves[..DEFAULT_BATCH_SIZE]);
        if t.filled_subtrees() != &expected.frontier[..] || t.root() != expected.root {
            bail!("frontier does not match the local transition");
        }
        println!("  root:          {}", t.root());
        println!("  payer balance: {} LINK", link(arborist.link_payer_balance(PAYER)));
        println!("  node balance:  {} LINK", link(arborist.link_node_balance(NODE)));
    }

    // ── Phase 4: next batch blocked until top-up ──
    println!("\n[4] Committing the next batch with an empty escrow");
    {
        let mut arborist = handle.lock().await;
        for leaf in &leaves[DEFAULT_BATCH_SIZE..] {
            arborist.commit(tree, *leaf)?;
        }
        match arborist.check_mass_update(tree) {
            Err(ArboristError::Tree(TreeError::InsufficientLinkBalance { needed, available })) => {
                println!(
                    "  checkMassUpdate blocked: needs {} LINK, payer has {}",
                    link(needed),
                    link(available)
                );
            }
            other => bail!("expected InsufficientLinkBalance, got {other:?}"),
        }

        println!("  topping up 1 LINK");
        arborist.token_mut().approve(PAYER, ARBORIST, ONE_LINK);
        arborist.top_up(PAYER, PAYER, ONE_LINK)?;
        if let Some(TriggerOutcome::Requested { request_id }) = arborist.retrigger(tree)? {
            let short = &hex::encode(request_id.0)[..16];
            println!("  retriggered:     oracle request 0x{short}... (epoch 1)");
        }
    }
    for outcome in node.poll_once().await? {
        if let JobOutcome::Submitted { consumed, .. } = outcome {
            println!("  submitted {consumed} more leaves");
        }
    }

    // ── Phase 5: collect ──
    println!("\n[5] Node collects its earnings");
    let mut arborist = handle.lock().await;
    let earned = arborist.collect_link_node_link(NODE)?;
    let wallet = arborist.token().balance_of(NODE);
    println!("  collected {} LINK, wallet holds {} LINK", link(earned), link(wallet));
    println!("  solvent: {}", arborist.is_solvent());

    println!("\n=== Demo completed ===");
    Ok(())
}
