//! Payment orchestrator: clones trees on funding, escrows LINK between payers
//! and oracle nodes, triggers oracle jobs when a queue fills, and settles
//! payment only for verified mass updates.
//!
//! All methods are atomic ledger calls. They validate everything that can
//! fail before the first mutation, so an `Err` leaves balances, trees and the
//! event log untouched.

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, LogData, B256, U256};
use tracing::{debug, info, warn};

use crate::adapters::abi::{check_mass_update_selector, encode_event};
use crate::config::{TriggerMode, VmTreeConfig};
use crate::domain::events::{request_id, ArboristEvent, OracleRequest};
use crate::domain::payload::{decode_deploy, DeployRequest, PayloadError};
use crate::domain::proof::Groth16Proof;
use crate::ports::token::{LinkToken, TokenError};
use crate::ports::verifier::ProofVerifier;
use crate::ports::{MassUpdateRequest, TreeInfo};
use crate::tree::{
    CommitReceipt, OnQueueFull, OnUpdateSettled, PaymentGate, TreeController, TreeError,
    TriggerOutcome, UpdateKind,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ArboristError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("tree not found: {0}")]
    UnknownTree(Address),

    #[error("insufficient balance for {owner}: has {balance}, requested {requested}")]
    InsufficientBalance {
        owner: Address,
        balance: U256,
        requested: U256,
    },

    #[error("{caller} is not authorized to call {operation}")]
    Unauthorized {
        caller: Address,
        operation: &'static str,
    },

    #[error("invalid deploy payload: {0}")]
    Payload(String),

    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

impl From<PayloadError> for ArboristError {
    fn from(e: PayloadError) -> Self {
        ArboristError::Payload(e.to_string())
    }
}

/// Shape and trigger policy of every cloned tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArboristSettings {
    pub depth: usize,
    pub batch_size: usize,
    pub trigger: TriggerMode,
}

impl From<&VmTreeConfig> for ArboristSettings {
    fn from(config: &VmTreeConfig) -> Self {
        Self {
            depth: config.tree.depth,
            batch_size: config.tree.batch_size,
            trigger: config.trigger.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct TreeRecord {
    controller: Address,
    payer: Address,
    name: String,
    epoch: u64,
    /// Id of the batch announced for the current epoch. Payment and the
    /// epoch only move while it is set.
    announced: Option<B256>,
}

/// Escrow balances, tree records and the event log. Implements the tree
/// hooks, so a tree call borrows it alongside the tree itself.
#[derive(Debug)]
struct Ledger {
    arborist: Address,
    trigger: TriggerMode,
    records: HashMap<Address, TreeRecord>,
    payer_balances: HashMap<Address, U256>,
    node_balances: HashMap<Address, U256>,
    events: Vec<ArboristEvent>,
}

impl Ledger {
    fn payer_balance(&self, payer: Address) -> U256 {
        self.payer_balances.get(&payer).copied().unwrap_or_default()
    }

    fn node_balance(&self, node: Address) -> U256 {
        self.node_balances.get(&node).copied().unwrap_or_default()
    }

    fn record(&self, tree: Address) -> Result<&TreeRecord, TreeError> {
        self.records.get(&tree).ok_or(TreeError::Unregistered(tree))
    }

    fn emit(&mut self, event: ArboristEvent) {
        debug!(?event, "event");
        self.events.push(event);
    }
}

impl PaymentGate for Ledger {
    fn ensure_payable(&self, tree: Address) -> Result<(), TreeError> {
        let record = self.record(tree)?;
        let needed = self.trigger.payment();
        let available = self.payer_balance(record.payer);
        if available < needed {
            return Err(TreeError::InsufficientLinkBalance { needed, available });
        }
        Ok(())
    }
}

impl OnQueueFull for Ledger {
    fn on_queue_full(&mut self, tree: Address) -> TriggerOutcome {
        if let Err(e) = self.ensure_payable(tree) {
            warn!(%tree, error = %e, "oracle request withheld");
            return TriggerOutcome::Blocked(e);
        }
        let Some(record) = self.records.get_mut(&tree) else {
            return TriggerOutcome::Blocked(TreeError::Unregistered(tree));
        };
        let epoch = record.epoch;
        let request_id = request_id(tree, epoch);
        record.announced = Some(request_id);

        match self.trigger.clone() {
            TriggerMode::OracleRequest { spec_id, payment } => {
                info!(%tree, epoch, %request_id, "oracle request emitted");
                self.emit(ArboristEvent::OracleRequest(OracleRequest {
                    spec_id,
                    callback_address: self.arborist,
                    request_id,
                    payment,
                    callback_target: tree,
                    selector: check_mass_update_selector().into(),
                    cancel_expiration: U256::ZERO,
                    data_version: U256::from(1),
                    extra_data: Bytes::new(),
                    epoch,
                }));
                TriggerOutcome::Requested { request_id }
            }
            TriggerMode::BatchReady => {
                info!(%tree, epoch, "batch ready");
                self.emit(ArboristEvent::BatchReady { tree, epoch });
                TriggerOutcome::Ready
            }
        }
    }
}

impl OnUpdateSettled for Ledger {
    fn on_update_settled(
        &mut self,
        tree: Address,
        submitter: Address,
        kind: UpdateKind,
    ) -> Result<(), TreeError> {
        let record = self.record(tree)?;
        let payer = record.payer;
        let announced = record.announced;

        // The controller took the head of the queue, so the announced batch is
        // gone. Refilling the queue announces it again.
        if kind == UpdateKind::Single {
            if let Some(record) = self.records.get_mut(&tree) {
                record.announced = None;
            }
            return Ok(());
        }
        let Some(request_id) = announced else {
            debug!(%tree, node = %submitter, "unannounced batch applied without payment");
            return Ok(());
        };
        let payment = self.trigger.payment();
        self.ensure_payable(tree)?;

        if let Some(record) = self.records.get_mut(&tree) {
            record.epoch += 1;
            record.announced = None;
        }
        if payment.is_zero() {
            return Ok(());
        }

        *self.payer_balances.entry(payer).or_default() -= payment;
        *self.node_balances.entry(submitter).or_default() += payment;
        info!(%tree, node = %submitter, %payer, %payment, %request_id, "payment harvested");
        self.emit(ArboristEvent::Harvested {
            tree,
            node: submitter,
            payer,
            amount: payment,
        });
        Ok(())
    }
}

/// Factory, registry and escrow for VMTree instances.
pub struct Arborist<T: LinkToken, V: ProofVerifier> {
    address: Address,
    settings: ArboristSettings,
    token: T,
    verifier: V,
    trees: HashMap<Address, TreeController>,
    ledger: Ledger,
    nonce: u64,
}

impl<T: LinkToken, V: ProofVerifier> Arborist<T, V> {
    pub fn new(address: Address, token: T, verifier: V, settings: ArboristSettings) -> Self {
        let ledger = Ledger {
            arborist: address,
            trigger: settings.trigger.clone(),
            records: HashMap::new(),
            payer_balances: HashMap::new(),
            node_balances: HashMap::new(),
            events: Vec::new(),
        };
        Self {
            address,
            settings,
            token,
            verifier,
            trees: HashMap::new(),
            ledger,
            nonce: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn settings(&self) -> &ArboristSettings {
        &self.settings
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Direct token access for calls that do not involve the orchestrator
    /// (transfers between users, approvals).
    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    // ── Funding / deploy ─────────────────────────────────────────────────────

    /// ERC-677 `onTokenTransfer` callback. Only the LINK token may call it,
    /// after it has moved `amount` to the orchestrator.
    pub fn on_token_transfer(
        &mut self,
        caller: Address,
        sender: Address,
        amount: U256,
        data: &[u8],
    ) -> Result<Address, ArboristError> {
        if caller != self.token.address() {
            return Err(ArboristError::Unauthorized {
                caller,
                operation: "onTokenTransfer",
            });
        }
        let request = decode_deploy(sender, data)?;
        Ok(self.clone_tree(sender, amount, request))
    }

    /// `transferAndCall(arborist, amount, data)` issued by `sender`: moves the
    /// tokens and runs the callback in one step.
    pub fn transfer_and_call(
        &mut self,
        sender: Address,
        amount: U256,
        data: &[u8],
    ) -> Result<Address, ArboristError> {
        let request = decode_deploy(sender, data)?;
        self.token.transfer(sender, self.address, amount)?;
        Ok(self.clone_tree(sender, amount, request))
    }

    fn clone_tree(&mut self, payer: Address, amount: U256, request: DeployRequest) -> Address {
        let tree = self.address.create(self.nonce);
        self.nonce += 1;

        let controller = TreeController::new(
            tree,
            request.controller,
            self.settings.depth,
            self.settings.batch_size,
        );
        self.trees.insert(tree, controller);
        self.ledger.records.insert(
            tree,
            TreeRecord {
                controller: request.controller,
                payer,
                name: request.name,
                epoch: 0,
                announced: None,
            },
        );
        *self.ledger.payer_balances.entry(payer).or_default() += amount;
        info!(%tree, controller = %request.controller, %payer, %amount, "tree created");
        self.ledger.emit(ArboristEvent::TreeCreated { tree });
        tree
    }

    // ── Tree operations ──────────────────────────────────────────────────────

    fn tree_ref(&self, tree: Address) -> Result<&TreeController, ArboristError> {
        self.trees.get(&tree).ok_or(ArboristError::UnknownTree(tree))
    }

    pub fn tree(&self, tree: Address) -> Option<&TreeController> {
        self.trees.get(&tree)
    }

    pub fn tree_addresses(&self) -> Vec<Address> {
        self.trees.keys().copied().collect()
    }

    pub fn tree_info(&self, tree: Address) -> Result<TreeInfo, ArboristError> {
        let controller = self.tree_ref(tree)?;
        let record = self.ledger.record(tree)?;
        Ok(TreeInfo {
            tree,
            controller: record.controller,
            payer: record.payer,
            name: record.name.clone(),
            depth: controller.depth(),
            batch_size: controller.batch_size(),
            epoch: record.epoch,
        })
    }

    pub fn commit(&mut self, tree: Address, leaf: B256) -> Result<CommitReceipt, ArboristError> {
        let controller = self
            .trees
            .get_mut(&tree)
            .ok_or(ArboristError::UnknownTree(tree))?;
        Ok(controller.commit(leaf, &mut self.ledger)?)
    }

    /// `checkMassUpdate()` of `tree`, gated on the payer's escrow.
    pub fn check_mass_update(&self, tree: Address) -> Result<MassUpdateRequest, ArboristError> {
        Ok(self.tree_ref(tree)?.check_mass_update(&self.ledger)?)
    }

    pub fn get_filled_subtrees(&self, tree: Address) -> Result<&[B256], ArboristError> {
        Ok(self.tree_ref(tree)?.filled_subtrees())
    }

    /// Single-leaf update submitted by the tree's controller.
    pub fn update(
        &mut self,
        tree: Address,
        caller: Address,
        proof: &Groth16Proof,
        new_frontier: Vec<B256>,
    ) -> Result<(), ArboristError> {
        let controller = self
            .trees
            .get_mut(&tree)
            .ok_or(ArboristError::UnknownTree(tree))?;
        controller.update(caller, proof, new_frontier, &self.verifier, &mut self.ledger)?;
        Ok(())
    }

    /// `performMassUpdate(newRoot, newFrontier, proof)` submitted by an oracle node.
    pub fn perform_mass_update(
        &mut self,
        tree: Address,
        node: Address,
        new_root: B256,
        new_frontier: Vec<B256>,
        proof: &Groth16Proof,
    ) -> Result<(), ArboristError> {
        let controller = self
            .trees
            .get_mut(&tree)
            .ok_or(ArboristError::UnknownTree(tree))?;
        controller.perform_mass_update(
            node,
            new_root,
            new_frontier,
            proof,
            &self.verifier,
            &mut self.ledger,
        )?;
        Ok(())
    }

    /// Re-announce a full queue, e.g. after a top-up unblocked it. Same epoch,
    /// same request id. `None` when the queue is not full.
    pub fn retrigger(&mut self, tree: Address) -> Result<Option<TriggerOutcome>, ArboristError> {
        let controller = self.tree_ref(tree)?;
        if !controller.is_full() {
            return Ok(None);
        }
        Ok(Some(self.ledger.on_queue_full(tree)))
    }

    // ── Balances ─────────────────────────────────────────────────────────────

    pub fn link_payer_balance(&self, payer: Address) -> U256 {
        self.ledger.payer_balance(payer)
    }

    pub fn link_node_balance(&self, node: Address) -> U256 {
        self.ledger.node_balance(node)
    }

    /// Pay out everything `node` has earned. A zero balance is a zero transfer.
    pub fn collect_link_node_link(&mut self, node: Address) -> Result<U256, ArboristError> {
        let amount = self.ledger.node_balance(node);
        self.token.transfer(self.address, node, amount)?;
        self.ledger.node_balances.remove(&node);
        info!(%node, %amount, "node balance collected");
        self.ledger.emit(ArboristEvent::Collected {
            from: node,
            to: node,
            amount,
        });
        Ok(amount)
    }

    /// Withdraw `amount` of the caller's unspent escrow to `to`.
    pub fn collect_link_payer_link(
        &mut self,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ArboristError> {
        let balance = self.ledger.payer_balance(caller);
        if balance < amount {
            return Err(ArboristError::InsufficientBalance {
                owner: caller,
                balance,
                requested: amount,
            });
        }
        self.token.transfer(self.address, to, amount)?;
        self.ledger.payer_balances.insert(caller, balance - amount);
        info!(payer = %caller, %to, %amount, "payer balance collected");
        self.ledger.emit(ArboristEvent::Collected {
            from: caller,
            to,
            amount,
        });
        Ok(())
    }

    /// Credit `payer` with `amount` pulled from `caller` (requires approval).
    pub fn top_up(
        &mut self,
        caller: Address,
        payer: Address,
        amount: U256,
    ) -> Result<(), ArboristError> {
        self.token.transfer_from(self.address, caller, self.address, amount)?;
        *self.ledger.payer_balances.entry(payer).or_default() += amount;
        info!(%caller, %payer, %amount, "payer topped up");
        Ok(())
    }

    /// Escrow never exceeds the tokens actually held.
    pub fn is_solvent(&self) -> bool {
        let owed = self
            .ledger
            .payer_balances
            .values()
            .chain(self.ledger.node_balances.values())
            .fold(U256::ZERO, |acc, v| acc.saturating_add(*v));
        owed <= self.token.balance_of(self.address)
    }

    // ── Events ───────────────────────────────────────────────────────────────

    pub fn events(&self) -> &[ArboristEvent] {
        &self.ledger.events
    }

    /// Events as EVM logs.
    pub fn event_logs(&self) -> Vec<LogData> {
        self.ledger.events.iter().map(encode_event).collect()
    }
}
