//! Funding payload carried by `transferAndCall` into the orchestrator.

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolValue;

/// Name given to trees funded without one.
pub const DEFAULT_TREE_NAME: &str = "VMTree";

/// Decoded deploy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Address allowed to perform single-leaf updates on the new tree.
    pub controller: Address,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("padded address payload has non-zero high bytes")]
    DirtyAddressPadding,

    #[error("ABI decoding failed: {0}")]
    Abi(#[from] alloy::sol_types::Error),
}

/// ABI-encode `(controller, name)` as call parameters.
pub fn encode_deploy(controller: Address, name: &str) -> Bytes {
    (controller, name.to_string()).abi_encode_params().into()
}

/// Decode a funding payload.
///
/// - empty: the token sender becomes the controller
/// - 32 bytes: a left-padded controller address
/// - anything else: ABI `(address, string)` parameters
pub fn decode_deploy(sender: Address, data: &[u8]) -> Result<DeployRequest, PayloadError> {
    match data.len() {
        0 => Ok(DeployRequest {
            controller: sender,
            name: DEFAULT_TREE_NAME.to_string(),
        }),
        32 => {
            if data[..12].iter().any(|b| *b != 0) {
                return Err(PayloadError::DirtyAddressPadding);
            }
            Ok(DeployRequest {
                controller: Address::from_slice(&data[12..]),
                name: DEFAULT_TREE_NAME.to_string(),
            })
        }
        _ => {
            let (controller, name) = <(Address, String)>::abi_decode_params(data)?;
            Ok(DeployRequest { controller, name })
        }
    }
}
