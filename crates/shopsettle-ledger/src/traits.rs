//! Store collaborator interfaces.

use std::sync::Arc;

use rust_decimal::Decimal;
use shopsettle_types::{Account, AccountId, Order, Product, ProductId, RequestToken, Result};

/// Account rows as seen from inside a transaction.
pub trait AccountLedger {
    /// Read an account. `Ok(None)` when it does not exist.
    fn account(&mut self, id: AccountId) -> Result<Option<Account>>;

    /// Add `delta` (possibly negative) to the balance. Returns the new row.
    ///
    /// # Errors
    /// `AccountNotFound` for a missing row, `BalanceUnderflow` if the result
    /// would be negative.
    fn adjust_balance(&mut self, id: AccountId, delta: Decimal) -> Result<Account>;
}

/// Product rows as seen from inside a transaction.
pub trait ProductLedger {
    /// Read a product. `Ok(None)` when it does not exist.
    fn product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Add `delta` (possibly negative) to the stock. Returns the new row.
    ///
    /// # Errors
    /// `ProductNotFound` for a missing row, `StockUnderflow` if the result
    /// would be negative.
    fn adjust_quantity(&mut self, id: ProductId, delta: i64) -> Result<Product>;
}

/// Order rows as seen from inside a transaction.
pub trait OrderLedger {
    /// Look up the order occupying `(buyer, token)`, if any.
    fn find_order(&mut self, buyer: AccountId, token: &RequestToken) -> Result<Option<Order>>;

    /// Insert a new order.
    ///
    /// # Errors
    /// `DuplicateKey` when `(buyer, token)` is already taken, either at call
    /// time or at commit.
    fn insert_order(&mut self, order: Order) -> Result<()>;
}

/// Everything a transaction body may touch.
pub trait LedgerTxn: AccountLedger + ProductLedger + OrderLedger {}

impl<T: AccountLedger + ProductLedger + OrderLedger + ?Sized> LedgerTxn for T {}

/// The transaction boundary.
pub trait TransactionalStore: Send + Sync {
    /// Run `body` in one transaction and commit if it returns `Ok`.
    ///
    /// Nothing the body wrote is visible to anyone unless this returns `Ok`.
    ///
    /// # Errors
    /// - `Conflict` if the store cannot serialize the transaction
    /// - `DuplicateKey` if an inserted order hits the unique index
    /// - whatever the body returned
    fn run_in_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> Result<T>;
}

impl<S: TransactionalStore> TransactionalStore for Arc<S> {
    fn run_in_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> Result<T>,
    {
        (**self).run_in_transaction(body)
    }
}
