//! Product rows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, ProductId, Result, SettleError};

/// A listed product, owned by exactly one seller account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// The seller credited when this product is bought.
    pub owner: AccountId,
    pub name: String,
    pub unit_price: Decimal,
    /// Stock on hand. Never negative at a committed state.
    pub quantity: u64,
}

impl Product {
    /// Create a product listing.
    ///
    /// # Errors
    /// Returns [`SettleError::InvalidProduct`] for a blank name or a
    /// negative unit price.
    pub fn new(
        owner: AccountId,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: u64,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SettleError::InvalidProduct {
                reason: "name must not be blank".into(),
            });
        }
        if unit_price < Decimal::ZERO {
            return Err(SettleError::InvalidProduct {
                reason: format!("unit price {unit_price} is negative"),
            });
        }
        Ok(Self {
            id: ProductId::new(),
            owner,
            name,
            unit_price,
            quantity,
        })
    }

    /// Price of `quantity` units, or `None` on decimal overflow.
    #[must_use]
    pub fn cost_of(&self, quantity: u32) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(quantity))
    }

    #[must_use]
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        u64::from(quantity) <= self.quantity
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Product {
    pub fn dummy(owner: AccountId, unit_price: Decimal, quantity: u64) -> Self {
        Self {
            id: ProductId::new(),
            owner,
            name: format!("product-{:05}", rand::random::<u16>()),
            unit_price,
            quantity,
        }
    }
}
