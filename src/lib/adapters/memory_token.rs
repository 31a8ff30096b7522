use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::ports::token::{LinkToken, TokenError};

/// One LINK in base units (18 decimals).
pub const ONE_LINK: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Total supply of the LINK token.
pub fn link_total_supply() -> U256 {
    U256::from(1_000_000_000u64) * ONE_LINK
}

/// In-memory ERC-20 ledger standing in for the LINK token.
#[derive(Debug, Clone)]
pub struct MemoryLinkToken {
    address: Address,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl MemoryLinkToken {
    /// Deploy with the whole supply minted to `deployer`.
    pub fn new(address: Address, deployer: Address, total_supply: U256) -> Self {
        let mut balances = HashMap::new();
        balances.insert(deployer, total_supply);
        Self {
            address,
            total_supply,
            balances,
            allowances: HashMap::new(),
        }
    }

    fn debit(&mut self, owner: Address, amount: U256) -> Result<(), TokenError> {
        let balance = self.balance_of(owner);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                owner,
                balance,
                needed: amount,
            });
        }
        self.balances.insert(owner, balance - amount);
        Ok(())
    }

    fn credit(&mut self, owner: Address, amount: U256) {
        *self.balances.entry(owner).or_default() += amount;
    }
}

impl LinkToken for MemoryLinkToken {
    fn address(&self) -> Address {
        self.address
    }

    fn total_supply(&self) -> U256 {
        self.total_supply
    }

    fn balance_of(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((owner, spender), amount);
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: from,
                spender,
                allowance,
                needed: amount,
            });
        }
        self.debit(from, amount)?;
        self.allowances.insert((from, spender), allowance - amount);
        self.credit(to, amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = Address::new([0x1c; 20]);
    const DEPLOYER: Address = Address::new([0xde; 20]);
    const ALICE: Address = Address::new([0xa1; 20]);

    fn token() -> MemoryLinkToken {
        MemoryLinkToken::new(TOKEN, DEPLOYER, link_total_supply())
    }

    #[test]
    fn test_deployer_holds_total_supply() {
        let t = token();
        assert_eq!(t.balance_of(DEPLOYER), t.total_supply());
        assert_eq!(ONE_LINK, U256::from(10u64).pow(U256::from(18)));
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut t = token();
        t.transfer(DEPLOYER, ALICE, ONE_LINK).unwrap();
        assert_eq!(t.balance_of(ALICE), ONE_LINK);
        assert_eq!(t.balance_of(DEPLOYER), t.total_supply() - ONE_LINK);
    }

    #[test]
    fn test_transfer_insufficient() {
        let mut t = token();
        let err = t.transfer(ALICE, DEPLOYER, U256::from(1)).unwrap_err();
        assert_eq!(
            err,
            TokenError::InsufficientBalance {
                owner: ALICE,
                balance: U256::ZERO,
                needed: U256::from(1)
            }
        );
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut t = token();
        t.approve(DEPLOYER, ALICE, ONE_LINK);
        t.transfer_from(ALICE, DEPLOYER, ALICE, ONE_LINK / U256::from(4)).unwrap();
        assert_eq!(t.allowance(DEPLOYER, ALICE), ONE_LINK * U256::from(3) / U256::from(4));

        let err = t.transfer_from(ALICE, DEPLOYER, ALICE, ONE_LINK).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientAllowance { .. }));
    }
}
