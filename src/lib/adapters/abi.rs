use alloy::primitives::{Bytes, LogData, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

use crate::domain::events::ArboristEvent;
use crate::domain::proof::Groth16Proof;

sol! {
    interface IVMTree {
        function commit(uint256 leaf) external;

        function checkMassUpdate() external view returns (
            uint256[] memory leaves,
            uint256[] memory filledSubtrees,
            uint256 startIndex
        );

        function getFilledSubtrees() external view returns (uint256[] memory);

        function update(
            uint256[2] a,
            uint256[2][2] b,
            uint256[2] c,
            uint256[] newSubtrees
        ) external;

        function performMassUpdate(
            uint256 newRoot,
            uint256[] newSubtrees,
            uint256[2] a,
            uint256[2][2] b,
            uint256[2] c
        ) external;
    }

    interface IArborist {
        function onTokenTransfer(address sender, uint256 amount, bytes data) external;
        function linkPayerBalance(address payer) external view returns (uint256);
        function linkNodeBalance(address node) external view returns (uint256);
        function collectLinkNodeLink(address node) external;
        function collectLinkPayerLink(address to, uint256 amount) external;
        function topUp(address payer, uint256 amount) external;

        event TreeCreated(address indexed tree);

        event OracleRequest(
            bytes32 indexed specId,
            address requester,
            bytes32 requestId,
            uint256 payment,
            address callbackAddr,
            bytes4 callbackFunctionId,
            uint256 cancelExpiration,
            uint256 dataVersion,
            bytes data
        );

        event BatchReady(address indexed tree);

        event Harvested(
            address indexed tree,
            address indexed node,
            address indexed payer,
            uint256 amount
        );

        event Collected(address indexed from, address indexed to, uint256 amount);
    }
}

/// Selector the oracle job calls back into (`checkMassUpdate()`).
pub fn check_mass_update_selector() -> [u8; 4] {
    IVMTree::checkMassUpdateCall::SELECTOR
}

/// Calldata of `performMassUpdate(newRoot, newSubtrees, a, b, c)`.
pub fn perform_mass_update_calldata(
    new_root: B256,
    new_frontier: &[B256],
    proof: &Groth16Proof,
) -> Bytes {
    IVMTree::performMassUpdateCall {
        newRoot: U256::from_be_bytes(new_root.0),
        newSubtrees: new_frontier.iter().map(|v| U256::from_be_bytes(v.0)).collect(),
        a: proof.a,
        b: proof.b,
        c: proof.c,
    }
    .abi_encode()
    .into()
}

/// EVM log encoding of an orchestrator event.
pub fn encode_event(event: &ArboristEvent) -> LogData {
    match event {
        ArboristEvent::TreeCreated { tree } => {
            IArborist::TreeCreated { tree: *tree }.encode_log_data()
        }
        ArboristEvent::OracleRequest(req) => IArborist::OracleRequest {
            specId: req.spec_id,
            requester: req.callback_address,
            requestId: req.request_id,
            payment: req.payment,
            callbackAddr: req.callback_target,
            callbackFunctionId: req.selector,
            cancelExpiration: req.cancel_expiration,
            dataVersion: req.data_version,
            data: req.extra_data.clone(),
        }
        .encode_log_data(),
        ArboristEvent::BatchReady { tree, .. } => {
            IArborist::BatchReady { tree: *tree }.encode_log_data()
        }
        ArboristEvent::Harvested { tree, node, payer, amount } => IArborist::Harvested {
            tree: *tree,
            node: *node,
            payer: *payer,
            amount: *amount,
        }
        .encode_log_data(),
        ArboristEvent::Collected { from, to, amount } => IArborist::Collected {
            from: *from,
            to: *to,
            amount: *amount,
        }
        .encode_log_data(),
    }
}
