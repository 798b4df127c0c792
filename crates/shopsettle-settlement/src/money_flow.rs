//! Per-settlement money flow.
//!
//! Invariant checked before any balance is written:
//! ```text
//! Σ(debits) == Σ(credits) == order total
//! ```
//! Money only moves between accounts during settlement; it is never
//! created or destroyed.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use shopsettle_types::{AccountId, Result, SettleError, SettledLine};

/// Debits and credits of one settlement, aggregated per account.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MoneyFlow {
    debits: BTreeMap<AccountId, Decimal>,
    credits: BTreeMap<AccountId, Decimal>,
}

impl MoneyFlow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The flow of a purchase: the buyer pays every line, each line's
    /// seller receives its line total. Sellers with several lines are summed.
    pub fn for_purchase(buyer: AccountId, lines: &[SettledLine]) -> Result<Self> {
        let mut flow = Self::new();
        for line in lines {
            flow.debit(buyer, line.line_total)?;
            flow.credit(line.seller, line.line_total)?;
        }
        Ok(flow)
    }

    /// Record money leaving `account`.
    pub fn debit(&mut self, account: AccountId, amount: Decimal) -> Result<()> {
        Self::add(&mut self.debits, account, amount)
    }

    /// Record money arriving at `account`.
    pub fn credit(&mut self, account: AccountId, amount: Decimal) -> Result<()> {
        Self::add(&mut self.credits, account, amount)
    }

    fn add(side: &mut BTreeMap<AccountId, Decimal>, account: AccountId, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(SettleError::ConservationViolation {
                reason: format!("negative transfer amount {amount} for {account}"),
            });
        }
        let entry = side.entry(account).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| SettleError::Internal(format!("amount overflow for {account}")))?;
        Ok(())
    }

    #[must_use]
    pub fn total_debited(&self) -> Decimal {
        self.debits.values().copied().sum()
    }

    #[must_use]
    pub fn total_credited(&self) -> Decimal {
        self.credits.values().copied().sum()
    }

    pub fn debits(&self) -> impl Iterator<Item = (AccountId, Decimal)> + '_ {
        self.debits.iter().map(|(account, amount)| (*account, *amount))
    }

    pub fn credits(&self) -> impl Iterator<Item = (AccountId, Decimal)> + '_ {
        self.credits.iter().map(|(account, amount)| (*account, *amount))
    }

    /// Check debits and credits balance, and match `expected_total`.
    ///
    /// # Errors
    /// Returns [`SettleError::ConservationViolation`] on any mismatch.
    pub fn verify(&self, expected_total: Decimal) -> Result<()> {
        let debited = self.total_debited();
        let credited = self.total_credited();
        if debited != credited || debited != expected_total {
            return Err(SettleError::ConservationViolation {
                reason: format!(
                    "debited {debited}, credited {credited}, order total {expected_total}"
                ),
            });
        }
        Ok(())
    }
}
