//! Purchase requests.
//!
//! A [`PurchaseRequest`] is one settlement attempt as the caller submitted
//! it: a buyer, an idempotency token and a non-empty set of distinct
//! product lines. [`PurchaseRequest::validate`] runs before any ledger
//! state is touched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AccountId, ProductId, RequestToken, Result, SettleError, constants};

/// One `(product, quantity)` line of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: ProductId,
    /// Units requested. Zero is rejected at validation.
    pub quantity: u32,
}

/// A purchase as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub buyer: AccountId,
    /// `None` models a caller that sent no token at all.
    pub request_token: Option<RequestToken>,
    /// Keyed by product so each product appears at most once.
    pub lines: BTreeMap<ProductId, PurchaseLine>,
}

impl PurchaseRequest {
    #[must_use]
    pub fn new(buyer: AccountId, request_token: impl Into<RequestToken>) -> Self {
        Self {
            buyer,
            request_token: Some(request_token.into()),
            lines: BTreeMap::new(),
        }
    }

    /// Request without a token. Always fails validation.
    #[must_use]
    pub fn without_token(buyer: AccountId) -> Self {
        Self {
            buyer,
            request_token: None,
            lines: BTreeMap::new(),
        }
    }

    /// Set the line for `product_id`, replacing any earlier line for it.
    pub fn set_line(&mut self, product_id: ProductId, quantity: u32) {
        self.lines.insert(
            product_id,
            PurchaseLine {
                product_id,
                quantity,
            },
        );
    }

    /// Builder form of [`PurchaseRequest::set_line`].
    #[must_use]
    pub fn with_line(mut self, product_id: ProductId, quantity: u32) -> Self {
        self.set_line(product_id, quantity);
        self
    }

    /// Check the request shape and return its token.
    ///
    /// # Errors
    /// [`SettleError::InvalidRequest`] with reason `"missing token"`,
    /// `"token too long"`, `"empty items"`, `"non-positive quantity"` or
    /// `"too many items"`.
    pub fn validate(&self, max_lines: usize) -> Result<&RequestToken> {
        let token = match &self.request_token {
            Some(token) if !token.is_blank() => token,
            _ => return Err(SettleError::invalid_request("missing token")),
        };
        if token.as_str().len() > constants::MAX_REQUEST_TOKEN_LEN {
            return Err(SettleError::invalid_request("token too long"));
        }
        if self.lines.is_empty() {
            return Err(SettleError::invalid_request("empty items"));
        }
        if self.lines.values().any(|line| line.quantity == 0) {
            return Err(SettleError::invalid_request("non-positive quantity"));
        }
        if self.lines.len() > max_lines {
            return Err(SettleError::invalid_request("too many items"));
        }
        Ok(token)
    }

    /// SHA-256 fingerprint of the purchase lines (hex).
    ///
    /// Two requests with the same lines share a digest regardless of the
    /// order the lines were added in.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(constants::PURCHASE_DIGEST_DOMAIN);
        for line in self.lines.values() {
            hasher.update(line.product_id.0.as_bytes());
            hasher.update(line.quantity.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PurchaseRequest {
        PurchaseRequest::new(AccountId::new(), "req-1")
    }

    fn reason(err: &SettleError) -> &str {
        match err {
            SettleError::InvalidRequest { reason } => reason,
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn missing_token_rejected() {
        let req = PurchaseRequest::without_token(AccountId::new()).with_line(ProductId::new(), 1);
        let err = req.validate(10).unwrap_err();
        assert_eq!(reason(&err), "missing token");
    }

    #[test]
    fn blank_token_rejected() {
        let req = PurchaseRequest::new(AccountId::new(), "   ").with_line(ProductId::new(), 1);
        let err = req.validate(10).unwrap_err();
        assert_eq!(reason(&err), "missing token");
    }

    #[test]
    fn long_token_rejected() {
        let token = "x".repeat(constants::MAX_REQUEST_TOKEN_LEN + 1);
        let req = PurchaseRequest::new(AccountId::new(), token).with_line(ProductId::new(), 1);
        let err = req.validate(10).unwrap_err();
        assert_eq!(reason(&err), "token too long");
    }

    #[test]
    fn empty_items_rejected() {
        let err = request().validate(10).unwrap_err();
        assert_eq!(reason(&err), "empty items");
    }

    #[test]
    fn zero_quantity_rejected() {
        let req = request()
            .with_line(ProductId::new(), 2)
            .with_line(ProductId::new(), 0);
        let err = req.validate(10).unwrap_err();
        assert_eq!(reason(&err), "non-positive quantity");
    }

    #[test]
    fn too_many_items_rejected() {
        let req = request()
            .with_line(ProductId::new(), 1)
            .with_line(ProductId::new(), 1);
        let err = req.validate(1).unwrap_err();
        assert_eq!(reason(&err), "too many items");
    }

    #[test]
    fn valid_request_returns_token() {
        let req = request().with_line(ProductId::new(), 3);
        assert_eq!(req.validate(10).unwrap().as_str(), "req-1");
    }

    #[test]
    fn set_line_replaces_previous_quantity() {
        let product = ProductId::new();
        let req = request().with_line(product, 2).with_line(product, 5);
        assert_eq!(req.lines.len(), 1);
        assert_eq!(req.lines[&product].quantity, 5);
    }

    #[test]
    fn digest_ignores_insertion_order() {
        let a = ProductId::new();
        let b = ProductId::new();
        let buyer = AccountId::new();
        let first = PurchaseRequest::new(buyer, "t").with_line(a, 1).with_line(b, 2);
        let second = PurchaseRequest::new(buyer, "t").with_line(b, 2).with_line(a, 1);
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);

        let third = PurchaseRequest::new(buyer, "t").with_line(a, 1).with_line(b, 3);
        assert_ne!(first.digest(), third.digest());
    }
}
