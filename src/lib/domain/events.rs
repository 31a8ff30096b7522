use alloy::primitives::{keccak256, Address, Bytes, FixedBytes, B256, U256};
use alloy::sol_types::SolValue;

/// Request id of the oracle job for `tree` at `epoch`: `keccak256(abi.encode(tree, epoch))`.
pub fn request_id(tree: Address, epoch: u64) -> B256 {
    keccak256((tree, U256::from(epoch)).abi_encode())
}

/// Oracle job request, shaped after the generic oracle `OracleRequest` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub spec_id: B256,
    /// Contract that receives the fulfilment (the orchestrator).
    pub callback_address: Address,
    pub request_id: B256,
    pub payment: U256,
    /// Tree whose batch must be proven.
    pub callback_target: Address,
    pub selector: FixedBytes<4>,
    pub cancel_expiration: U256,
    pub data_version: U256,
    pub extra_data: Bytes,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArboristEvent {
    TreeCreated {
        tree: Address,
    },
    OracleRequest(OracleRequest),
    /// Payment-free trigger.
    BatchReady {
        tree: Address,
        epoch: u64,
    },
    Harvested {
        tree: Address,
        node: Address,
        payer: Address,
        amount: U256,
    },
    Collected {
        from: Address,
        to: Address,
        amount: U256,
    },
}

impl ArboristEvent {
    /// Tree the event refers to, if any.
    pub fn tree(&self) -> Option<Address> {
        match self {
            ArboristEvent::TreeCreated { tree }
            | ArboristEvent::BatchReady { tree, .. }
            | ArboristEvent::Harvested { tree, .. } => Some(*tree),
            ArboristEvent::OracleRequest(req) => Some(req.callback_target),
            ArboristEvent::Collected { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_deterministic() {
        let tree = Address::repeat_byte(0x01);
        assert_eq!(request_id(tree, 0), request_id(tree, 0));
        assert_ne!(request_id(tree, 0), request_id(tree, 1));
        assert_ne!(request_id(tree, 0), request_id(Address::repeat_byte(0x02), 0));
    }

    #[test]
    fn test_request_id_matches_abi_layout() {
        let tree = Address::repeat_byte(0x01);
        let mut preimage = [0u8; 64];
        preimage[12..32].copy_from_slice(tree.as_slice());
        preimage[63] = 7;
        assert_eq!(request_id(tree, 7), keccak256(preimage));
    }
}
