//! Supply conservation invariant checker.
//!
//! Settlement only moves money between accounts and moves stock out of
//! products into orders. So at every committed state:
//! ```text
//! Σ(account balances)                      == Σ(opening deposits)
//! ∀ product: on_hand + Σ(units in orders)  == units listed
//! ```
//!
//! If either breaks, money or stock was created or destroyed somewhere.

use std::collections::HashMap;

use rust_decimal::Decimal;
use shopsettle_types::{ProductId, Result, SettleError};

/// Tracks money and stock that entered the ledger from outside settlement.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    /// Total money deposited by account openings.
    deposits: Decimal,
    /// Units listed per product.
    listed: HashMap<ProductId, u64>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record money entering the ledger.
    pub fn record_deposit(&mut self, amount: Decimal) {
        self.deposits += amount;
    }

    /// Record stock entering the ledger for a product.
    pub fn record_listing(&mut self, product_id: ProductId, units: u64) {
        *self.listed.entry(product_id).or_insert(0) += units;
    }

    /// Units listed for a product (zero if unknown).
    #[must_use]
    pub fn listed_units(&self, product_id: ProductId) -> u64 {
        self.listed.get(&product_id).copied().unwrap_or(0)
    }

    /// Products with recorded listings.
    pub fn tracked_products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.listed.keys().copied()
    }

    /// Verify the sum of all balances equals total deposits.
    ///
    /// # Errors
    /// Returns [`SettleError::ConservationViolation`] if actual ≠ expected.
    pub fn verify_money(&self, actual: Decimal) -> Result<()> {
        if actual != self.deposits {
            return Err(SettleError::ConservationViolation {
                reason: format!(
                    "money: actual supply {actual} != deposits {}",
                    self.deposits
                ),
            });
        }
        Ok(())
    }

    /// Verify a product's stock on hand plus units sold equals units listed.
    ///
    /// # Errors
    /// Returns [`SettleError::ConservationViolation`] on mismatch.
    pub fn verify_stock(&self, product_id: ProductId, on_hand: u64, sold: u64) -> Result<()> {
        let listed = self.listed_units(product_id);
        if on_hand.checked_add(sold) != Some(listed) {
            return Err(SettleError::ConservationViolation {
                reason: format!(
                    "stock {product_id}: on hand {on_hand} + sold {sold} != listed {listed}"
                ),
            });
        }
        Ok(())
    }
}
