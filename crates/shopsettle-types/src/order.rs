//! Settled orders.
//!
//! An [`Order`] is created exactly once per `(buyer, token)` by the
//! settlement engine and never mutated afterwards. It snapshots what was
//! actually charged, so later price changes on a product do not alter it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, OrderId, OrderKey, ProductId, RequestToken};

/// One purchase line as settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledLine {
    pub product_id: ProductId,
    /// Owner of the product at settlement time; credited `line_total`.
    pub seller: AccountId,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// `unit_price × quantity`, exact.
    pub line_total: Decimal,
}

/// An append-only order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer: AccountId,
    pub request_token: RequestToken,
    pub lines: Vec<SettledLine>,
    /// Sum of all `line_total`s; the amount debited from the buyer.
    pub total_cost: Decimal,
    /// Fingerprint of the request that produced this order.
    pub request_digest: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order with a fresh id. `total_cost` is derived from the lines.
    #[must_use]
    pub fn new(
        buyer: AccountId,
        request_token: RequestToken,
        lines: Vec<SettledLine>,
        request_digest: String,
    ) -> Self {
        let total_cost = lines.iter().map(|line| line.line_total).sum();
        Self {
            id: OrderId::new(),
            buyer,
            request_token,
            lines,
            total_cost,
            request_digest,
            created_at: Utc::now(),
        }
    }

    /// The idempotency key this order occupies.
    #[must_use]
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.buyer, self.request_token.clone())
    }

    /// Amount owed to each seller. Lines sharing a seller are summed.
    #[must_use]
    pub fn seller_credits(&self) -> BTreeMap<AccountId, Decimal> {
        let mut credits = BTreeMap::new();
        for line in &self.lines {
            *credits.entry(line.seller).or_insert(Decimal::ZERO) += line.line_total;
        }
        credits
    }

    /// Units settled for `product_id` (zero if not part of this order).
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u64 {
        self.lines
            .iter()
            .filter(|line| line.product_id == product_id)
            .map(|line| u64::from(line.quantity))
            .sum()
    }
}
