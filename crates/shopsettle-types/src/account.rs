//! Account rows.
//!
//! An account is a buyer in one settlement and a seller in another; the
//! role is contextual. Only the settlement engine moves `balance`, and only
//! inside a committed settlement transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Result, SettleError};

/// A balance-holding account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Display name; not used by settlement.
    pub name: String,
    /// Spendable balance. Never negative at a committed state.
    pub balance: Decimal,
}

impl Account {
    /// Create an account with an opening balance.
    ///
    /// # Errors
    /// Returns [`SettleError::InvalidAccount`] for a blank name or a
    /// negative opening balance.
    pub fn new(name: impl Into<String>, balance: Decimal) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SettleError::InvalidAccount {
                reason: "name must not be blank".into(),
            });
        }
        if balance < Decimal::ZERO {
            return Err(SettleError::InvalidAccount {
                reason: format!("opening balance {balance} is negative"),
            });
        }
        Ok(Self {
            id: AccountId::new(),
            name,
            balance,
        })
    }

    /// Whether the account can pay `amount` in full.
    #[must_use]
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Account {
    pub fn dummy(balance: Decimal) -> Self {
        Self {
            id: AccountId::new(),
            name: format!("user-{:05}", rand::random::<u16>()),
            balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_opening_balance() {
        let err = Account::new("alice", Decimal::new(-1, 2)).unwrap_err();
        assert!(matches!(err, SettleError::InvalidAccount { .. }));
    }

    #[test]
    fn rejects_blank_name() {
        let err = Account::new("  ", Decimal::ONE).unwrap_err();
        assert!(matches!(err, SettleError::InvalidAccount { .. }));
    }

    #[test]
    fn zero_balance_is_valid() {
        let account = Account::new("alice", Decimal::ZERO).unwrap();
        assert!(account.can_cover(Decimal::ZERO));
        assert!(!account.can_cover(Decimal::new(1, 2)));
    }

    #[test]
    fn can_cover_exact_amount() {
        let account = Account::dummy(Decimal::new(10, 0));
        assert!(account.can_cover(Decimal::new(10, 0)));
        assert!(!account.can_cover(Decimal::new(1001, 2)));
    }
}
