//! Idempotency by request token.
//!
//! Two layers keep "one order per `(buyer, token)`":
//!
//! 1. [`find_prior_order`] runs first inside every attempt, retries
//!    included, and short-circuits to the stored order.
//! 2. The store's unique index is the backstop for concurrent duplicates
//!    that both passed step 1. The loser's commit fails with
//!    `DuplicateKey`, and [`absorb_duplicate`] turns that into the winner's
//!    order.

use shopsettle_ledger::{LedgerTxn, TransactionalStore};
use shopsettle_types::{AccountId, Order, RequestToken, Result, SettleError};

/// Look up the order already settled for `(buyer, token)`.
///
/// A stored order whose digest differs from `digest` means the caller
/// reused a token for different lines; the stored order still wins.
pub fn find_prior_order(
    txn: &mut dyn LedgerTxn,
    buyer: AccountId,
    token: &RequestToken,
    digest: &str,
) -> Result<Option<Order>> {
    let prior = txn.find_order(buyer, token)?;
    if let Some(order) = &prior {
        if order.request_digest != digest {
            tracing::warn!(
                order = %order.id,
                buyer = %buyer,
                token = %token,
                "Request token reused with different purchase lines; returning original order"
            );
        }
    }
    Ok(prior)
}

/// Resolve a `DuplicateKey` rejection into the order that won the race.
///
/// Runs in a fresh transaction: the failed attempt's reads are discarded.
///
/// # Errors
/// Store errors from the lookup, or [`SettleError::Internal`] if the
/// index reported a duplicate but no order is visible.
pub fn absorb_duplicate<S: TransactionalStore>(
    store: &S,
    buyer: AccountId,
    token: &RequestToken,
    digest: &str,
) -> Result<Order> {
    let existing =
        store.run_in_transaction(|txn| find_prior_order(txn, buyer, token, digest))?;
    match existing {
        Some(order) => {
            tracing::warn!(
                order = %order.id,
                buyer = %buyer,
                token = %token,
                "Concurrent duplicate submission absorbed"
            );
            Ok(order)
        }
        None => Err(SettleError::Internal(format!(
            "duplicate key for {buyer}/{token} but no order found"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shopsettle_ledger::MemoryLedger;

    fn stored_order(ledger: &MemoryLedger, buyer: AccountId, token: &str, digest: &str) -> Order {
        let order = Order::new(buyer, RequestToken::from(token), Vec::new(), digest.into());
        ledger
            .run_in_transaction(|txn| txn.insert_order(order.clone()))
            .unwrap();
        order
    }

    #[test]
    fn no_prior_order() {
        let ledger = MemoryLedger::new();
        let buyer = ledger.open_account("buyer", Decimal::ONE).unwrap();
        let found = ledger
            .run_in_transaction(|txn| find_prior_order(txn, buyer, &"t".into(), "d"))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn prior_order_returned_even_if_digest_differs() {
        let ledger = MemoryLedger::new();
        let buyer = ledger.open_account("buyer", Decimal::ONE).unwrap();
        let order = stored_order(&ledger, buyer, "t", "original");
        let found = ledger
            .run_in_transaction(|txn| find_prior_order(txn, buyer, &"t".into(), "different"))
            .unwrap();
        assert_eq!(found, Some(order));
    }

    #[test]
    fn absorb_returns_winner() {
        let ledger = MemoryLedger::new();
        let buyer = ledger.open_account("buyer", Decimal::ONE).unwrap();
        let order = stored_order(&ledger, buyer, "t", "d");
        let absorbed = absorb_duplicate(&ledger, buyer, &"t".into(), "d").unwrap();
        assert_eq!(absorbed, order);
    }

    #[test]
    fn absorb_without_order_is_internal_error() {
        let ledger = MemoryLedger::new();
        let buyer = ledger.open_account("buyer", Decimal::ONE).unwrap();
        let err = absorb_duplicate(&ledger, buyer, &"t".into(), "d").unwrap_err();
        assert!(matches!(err, SettleError::Internal(_)));
    }
}
