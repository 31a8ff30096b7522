use alloy::primitives::{Address, U256};

/// Port for the payment token ledger (ERC-20 semantics, 18 decimals).
///
/// The orchestrator owns its token handle, so every transfer happens inside
/// the same atomic ledger call as the balance bookkeeping it backs.
///
/// Implementations:
/// - `MemoryLinkToken` (in-process ledger)
pub trait LinkToken {
    /// Address of the token contract; the only caller allowed to deliver
    /// transfer callbacks.
    fn address(&self) -> Address;

    fn total_supply(&self) -> U256;

    fn balance_of(&self, owner: Address) -> U256;

    fn allowance(&self, owner: Address, spender: Address) -> U256;

    fn approve(&mut self, owner: Address, spender: Address, amount: U256);

    /// Move `amount` from `from` to `to` on behalf of `from`.
    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TokenError>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient token balance for {owner}: has {balance}, needs {needed}")]
    InsufficientBalance {
        owner: Address,
        balance: U256,
        needed: U256,
    },

    #[error("insufficient allowance from {owner} to {spender}: has {allowance}, needs {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: U256,
        needed: U256,
    },
}
