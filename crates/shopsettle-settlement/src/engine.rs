//! The settlement engine.
//!
//! One call settles one purchase request as one logical transaction:
//! 1. Validate the request shape (no ledger access)
//! 2. Idempotency check: return the stored order for `(buyer, token)`
//! 3. Read the buyer and every product from the transaction's snapshot
//! 4. Check stock per line, then the buyer's balance against the total
//! 5. Debit the buyer, decrement stock, credit each seller
//! 6. Insert the order and commit
//!
//! Steps 2–6 re-run from scratch on every conflict retry.

use rust_decimal::Decimal;
use shopsettle_ledger::{LedgerTxn, TransactionalStore};
use shopsettle_types::{
    AccountId, Order, ProductId, PurchaseRequest, RequestToken, Result, SettleError, SettledLine,
    SettlementConfig, constants,
};

use crate::idempotency;
use crate::money_flow::MoneyFlow;
use crate::retry::ConflictRetryDriver;

/// How a successful call was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// This call settled the order.
    Settled(Order),
    /// The order already existed for this `(buyer, token)`; nothing was applied.
    Replayed(Order),
}

impl SettlementOutcome {
    #[must_use]
    pub fn order(&self) -> &Order {
        match self {
            Self::Settled(order) | Self::Replayed(order) => order,
        }
    }

    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Settled(order) | Self::Replayed(order) => order,
        }
    }

    #[must_use]
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed(_))
    }
}

/// Settles purchase requests against a [`TransactionalStore`].
///
/// Holds no ledger state of its own. Safe to share across threads when
/// the store is.
pub struct SettlementEngine<S> {
    store: S,
    driver: ConflictRetryDriver,
    config: SettlementConfig,
}

impl<S: TransactionalStore> SettlementEngine<S> {
    /// Create an engine over `store`.
    ///
    /// # Errors
    /// [`SettleError::Configuration`] if `config` fails validation.
    pub fn new(store: S, config: SettlementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    /// Create an engine with [`SettlementConfig::default`].
    #[must_use]
    pub fn with_defaults(store: S) -> Self {
        Self::build(store, SettlementConfig::default())
    }

    fn build(store: S, config: SettlementConfig) -> Self {
        tracing::debug!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            max_retries = config.retry.max_retries,
            max_lines = config.max_lines,
            "Settlement engine ready"
        );
        Self {
            store,
            driver: ConflictRetryDriver::new(config.retry.clone()),
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settle `request`, or return the order it already produced.
    ///
    /// # Errors
    /// - `InvalidRequest` for a malformed request (never retried)
    /// - `BuyerNotFound`, `ProductNotFound`, `InsufficientStock`,
    ///   `InsufficientBalance` as final business outcomes
    /// - `RetriesExhausted` if every attempt conflicted
    pub fn create_order(&self, request: &PurchaseRequest) -> Result<Order> {
        self.submit(request).map(SettlementOutcome::into_order)
    }

    /// Convenience form taking the buyer, lines and token directly.
    pub fn create_order_from_lines<I>(
        &self,
        buyer: AccountId,
        lines: I,
        request_token: Option<RequestToken>,
    ) -> Result<Order>
    where
        I: IntoIterator<Item = (ProductId, u32)>,
    {
        let mut request = PurchaseRequest::without_token(buyer);
        request.request_token = request_token;
        for (product_id, quantity) in lines {
            request.set_line(product_id, quantity);
        }
        self.create_order(&request)
    }

    /// Like [`SettlementEngine::create_order`], but reports whether the
    /// order was settled by this call or replayed.
    pub fn submit(&self, request: &PurchaseRequest) -> Result<SettlementOutcome> {
        let token = request.validate(self.config.max_lines)?;
        let digest = request.digest();

        self.driver.run(|attempt| {
            let result = self
                .store
                .run_in_transaction(|txn| settle_in_txn(txn, request, token, &digest));
            match result {
                Ok(SettlementOutcome::Settled(order)) => {
                    tracing::info!(
                        order = %order.id,
                        buyer = %order.buyer,
                        total = %order.total_cost,
                        lines = order.lines.len(),
                        attempt,
                        "Order settled"
                    );
                    Ok(SettlementOutcome::Settled(order))
                }
                Ok(SettlementOutcome::Replayed(order)) => {
                    tracing::debug!(
                        order = %order.id,
                        buyer = %order.buyer,
                        token = %token,
                        "Idempotent replay"
                    );
                    Ok(SettlementOutcome::Replayed(order))
                }
                Err(SettleError::DuplicateKey { buyer, token }) => {
                    idempotency::absorb_duplicate(&self.store, buyer, &token, &digest)
                        .map(SettlementOutcome::Replayed)
                }
                Err(err) => Err(err),
            }
        })
    }
}

/// The transactional body. Reads nothing from outside `txn`.
fn settle_in_txn(
    txn: &mut dyn LedgerTxn,
    request: &PurchaseRequest,
    token: &RequestToken,
    digest: &str,
) -> Result<SettlementOutcome> {
    if let Some(existing) = idempotency::find_prior_order(txn, request.buyer, token, digest)? {
        return Ok(SettlementOutcome::Replayed(existing));
    }

    let buyer = txn
        .account(request.buyer)?
        .ok_or(SettleError::BuyerNotFound(request.buyer))?;

    let mut lines = Vec::with_capacity(request.lines.len());
    let mut total_cost = Decimal::ZERO;
    for line in request.lines.values() {
        let product = txn
            .product(line.product_id)?
            .ok_or(SettleError::ProductNotFound(line.product_id))?;
        if !product.has_stock_for(line.quantity) {
            return Err(SettleError::InsufficientStock {
                product_id: product.id,
                requested: line.quantity,
                available: product.quantity,
            });
        }
        let line_total = product
            .cost_of(line.quantity)
            .ok_or_else(|| SettleError::Internal(format!("cost overflow on {}", product.id)))?;
        total_cost = total_cost
            .checked_add(line_total)
            .ok_or_else(|| SettleError::Internal("order total overflow".into()))?;
        lines.push(SettledLine {
            product_id: product.id,
            seller: product.owner,
            unit_price: product.unit_price,
            quantity: line.quantity,
            line_total,
        });
    }

    if !buyer.can_cover(total_cost) {
        return Err(SettleError::InsufficientBalance {
            needed: total_cost,
            available: buyer.balance,
        });
    }

    let flow = MoneyFlow::for_purchase(buyer.id, &lines)?;
    flow.verify(total_cost)?;

    for (account, amount) in flow.debits() {
        txn.adjust_balance(account, -amount)?;
    }
    for line in &lines {
        txn.adjust_quantity(line.product_id, -i64::from(line.quantity))?;
    }
    for (account, amount) in flow.credits() {
        txn.adjust_balance(account, amount)?;
    }

    let order = Order::new(buyer.id, token.clone(), lines, digest.to_owned());
    txn.insert_order(order.clone())?;
    Ok(SettlementOutcome::Settled(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsettle_ledger::MemoryLedger;
    use shopsettle_types::RetryConfig;

    fn engine() -> SettlementEngine<MemoryLedger> {
        SettlementEngine::with_defaults(MemoryLedger::new())
    }

    fn seed(
        engine: &SettlementEngine<MemoryLedger>,
        buyer_balance: Decimal,
        price: Decimal,
        quantity: u64,
    ) -> (AccountId, AccountId, ProductId) {
        let ledger = engine.store();
        let buyer = ledger.open_account("buyer", buyer_balance).unwrap();
        let seller = ledger.open_account("seller", Decimal::ZERO).unwrap();
        let product = ledger.list_product(seller, "widget", price, quantity).unwrap();
        (buyer, seller, product)
    }

    #[test]
    fn exact_balance_and_stock_settle() {
        let engine = engine();
        let (buyer, seller, product) = seed(&engine, Decimal::new(10, 0), Decimal::new(10, 0), 1);
        let request = PurchaseRequest::new(buyer, "req-1").with_line(product, 1);

        let order = engine.create_order(&request).unwrap();

        let ledger = engine.store();
        assert_eq!(order.total_cost, Decimal::new(10, 0));
        assert_eq!(ledger.account(buyer).unwrap().balance, Decimal::ZERO);
        assert_eq!(ledger.account(seller).unwrap().balance, Decimal::new(10, 0));
        assert_eq!(ledger.product(product).unwrap().quantity, 0);
        assert_eq!(ledger.order(order.id), Some(order));
    }

    #[test]
    fn invalid_request_touches_nothing() {
        let engine = engine();
        let (buyer, _, _) = seed(&engine, Decimal::ONE, Decimal::ONE, 1);
        let version = engine.store().version();

        let err = engine
            .create_order(&PurchaseRequest::new(buyer, "req-1"))
            .unwrap_err();
        assert!(err.is_invalid_request());
        assert_eq!(engine.store().version(), version);
        assert_eq!(engine.store().stats().commits, 0);
    }

    #[test]
    fn unknown_buyer() {
        let engine = engine();
        let (_, _, product) = seed(&engine, Decimal::ONE, Decimal::ONE, 1);
        let ghost = AccountId::new();
        let err = engine
            .create_order(&PurchaseRequest::new(ghost, "req-1").with_line(product, 1))
            .unwrap_err();
        assert_eq!(err, SettleError::BuyerNotFound(ghost));
    }

    #[test]
    fn unknown_product_aborts_whole_request() {
        let engine = engine();
        let (buyer, _, product) = seed(&engine, Decimal::new(100, 0), Decimal::ONE, 5);
        let ghost = ProductId::new();
        let err = engine
            .create_order(
                &PurchaseRequest::new(buyer, "req-1")
                    .with_line(product, 1)
                    .with_line(ghost, 1),
            )
            .unwrap_err();
        assert_eq!(err, SettleError::ProductNotFound(ghost));
        assert_eq!(engine.store().product(product).unwrap().quantity, 5);
        assert_eq!(engine.store().account(buyer).unwrap().balance, Decimal::new(100, 0));
    }

    #[test]
    fn insufficient_balance_reports_amounts() {
        let engine = engine();
        let (buyer, _, product) = seed(&engine, Decimal::new(999_999, 5), Decimal::new(5, 0), 999);
        let err = engine
            .create_order(&PurchaseRequest::new(buyer, "req-1").with_line(product, 2))
            .unwrap_err();
        assert_eq!(
            err,
            SettleError::InsufficientBalance {
                needed: Decimal::new(10, 0),
                available: Decimal::new(999_999, 5),
            }
        );
        assert_eq!(engine.store().order_count(), 0);
    }

    #[test]
    fn self_purchase_nets_out() {
        let engine = engine();
        let ledger = engine.store();
        let account = ledger.open_account("both", Decimal::new(20, 0)).unwrap();
        let product = ledger
            .list_product(account, "own", Decimal::new(7, 0), 3)
            .unwrap();

        engine
            .create_order(&PurchaseRequest::new(account, "req-1").with_line(product, 2))
            .unwrap();

        assert_eq!(ledger.account(account).unwrap().balance, Decimal::new(20, 0));
        assert_eq!(ledger.product(product).unwrap().quantity, 1);
        ledger.verify_supply().unwrap();
    }

    #[test]
    fn submit_distinguishes_replay() {
        let engine = engine();
        let (buyer, _, product) = seed(&engine, Decimal::new(100, 0), Decimal::ONE, 5);
        let request = PurchaseRequest::new(buyer, "req-1").with_line(product, 1);

        let first = engine.submit(&request).unwrap();
        let second = engine.submit(&request).unwrap();
        assert!(!first.is_replay());
        assert!(second.is_replay());
        assert_eq!(first.order(), second.order());
    }

    #[test]
    fn from_lines_without_token_is_invalid() {
        let engine = engine();
        let (buyer, _, product) = seed(&engine, Decimal::ONE, Decimal::ONE, 1);
        let err = engine
            .create_order_from_lines(buyer, [(product, 1)], None)
            .unwrap_err();
        assert_eq!(err, SettleError::invalid_request("missing token"));

        let order = engine
            .create_order_from_lines(buyer, [(product, 1)], Some("req-1".into()))
            .unwrap();
        assert_eq!(order.quantity_of(product), 1);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SettlementConfig {
            retry: RetryConfig::default().with_delays(10, 1),
            ..SettlementConfig::default()
        };
        let err = SettlementEngine::new(MemoryLedger::new(), config).err();
        assert!(matches!(err, Some(SettleError::Configuration(_))));

        let config = SettlementConfig {
            retry: RetryConfig::default().with_max_retries(u32::MAX),
            ..SettlementConfig::default()
        };
        let err = SettlementEngine::new(MemoryLedger::new(), config).err();
        assert!(matches!(err, Some(SettleError::Configuration(_))));
    }
}
