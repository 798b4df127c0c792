//! In-memory ledger with optimistic serializable transactions.
//!
//! ## Protocol
//!
//! ```text
//! 1. begin()            - empty read set, empty write buffer
//! 2. reads              - record (row, version) on first read; repeat reads
//!                         return the recorded value; own writes win
//! 3. writes             - buffered in the transaction, never shared
//! 4. commit()           - under the write lock:
//!    a. unique index    - any pending order's (buyer, token) taken → DuplicateKey
//!    b. read validation - any recorded version moved → Conflict
//!    c. apply           - all writes at one new global version
//! ```
//!
//! Absent rows and index slots are read at version 0, so a row or order
//! created after the read also invalidates it. A body that fails with a
//! business-rule error gets the same read validation, so such errors are
//! only reported when they held against a state no one has since changed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rust_decimal::Decimal;
use shopsettle_types::{
    Account, AccountId, Order, OrderId, OrderKey, Product, ProductId, RequestToken, Result,
    SettleError,
};

use crate::supply::SupplyConservation;
use crate::traits::{AccountLedger, LedgerTxn, OrderLedger, ProductLedger, TransactionalStore};

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Global commit version; bumped once per committed write transaction.
    version: u64,
    accounts: HashMap<AccountId, Versioned<Account>>,
    products: HashMap<ProductId, Versioned<Product>>,
    orders: HashMap<OrderId, Order>,
    /// Unique index on `(buyer, token)`.
    order_index: HashMap<OrderKey, Versioned<OrderId>>,
    supply: SupplyConservation,
}

impl LedgerState {
    fn account_version(&self, id: AccountId) -> u64 {
        self.accounts.get(&id).map_or(0, |row| row.version)
    }

    fn product_version(&self, id: ProductId) -> u64 {
        self.products.get(&id).map_or(0, |row| row.version)
    }

    fn key_version(&self, key: &OrderKey) -> u64 {
        self.order_index.get(key).map_or(0, |slot| slot.version)
    }

    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Point-in-time copy of the store's transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Transactions that committed (including read-only ones).
    pub commits: u64,
    /// Transactions rejected with `Conflict`.
    pub conflicts: u64,
    /// Transactions rejected by the `(buyer, token)` unique index.
    pub duplicate_keys: u64,
    /// Bodies that failed with a business-rule error on a valid snapshot.
    pub business_aborts: u64,
}

/// In-memory reference implementation of [`TransactionalStore`].
///
/// Also plays the outside collaborators' part: accounts and products are
/// created through [`MemoryLedger::open_account`] and
/// [`MemoryLedger::list_product`], which feed supply accounting.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    commits: AtomicU64,
    conflicts: AtomicU64,
    duplicate_keys: AtomicU64,
    business_aborts: AtomicU64,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------
    // Collaborator-side management
    // -----------------------------------------------------------------

    /// Open an account with an opening balance.
    pub fn open_account(&self, name: &str, balance: Decimal) -> Result<AccountId> {
        self.insert_account(Account::new(name, balance)?)
    }

    /// Insert a prepared account row.
    ///
    /// # Errors
    /// `InvalidAccount` for a negative balance or an id already in use.
    pub fn insert_account(&self, account: Account) -> Result<AccountId> {
        if account.balance < Decimal::ZERO {
            return Err(SettleError::InvalidAccount {
                reason: format!("opening balance {} is negative", account.balance),
            });
        }
        let mut state = self.state.write();
        if state.accounts.contains_key(&account.id) {
            return Err(SettleError::InvalidAccount {
                reason: format!("{} already exists", account.id),
            });
        }
        let id = account.id;
        let version = state.next_version();
        state.supply.record_deposit(account.balance);
        state.accounts.insert(
            id,
            Versioned {
                value: account,
                version,
            },
        );
        Ok(id)
    }

    /// List a product owned by `owner`.
    pub fn list_product(
        &self,
        owner: AccountId,
        name: &str,
        unit_price: Decimal,
        quantity: u64,
    ) -> Result<ProductId> {
        self.insert_product(Product::new(owner, name, unit_price, quantity)?)
    }

    /// Insert a prepared product row.
    ///
    /// # Errors
    /// `AccountNotFound` if the owner does not exist, `InvalidProduct` for a
    /// negative price or an id already in use.
    pub fn insert_product(&self, product: Product) -> Result<ProductId> {
        if product.unit_price < Decimal::ZERO {
            return Err(SettleError::InvalidProduct {
                reason: format!("unit price {} is negative", product.unit_price),
            });
        }
        let mut state = self.state.write();
        if !state.accounts.contains_key(&product.owner) {
            return Err(SettleError::AccountNotFound(product.owner));
        }
        if state.products.contains_key(&product.id) {
            return Err(SettleError::InvalidProduct {
                reason: format!("{} already exists", product.id),
            });
        }
        let id = product.id;
        let version = state.next_version();
        state.supply.record_listing(id, product.quantity);
        state.products.insert(
            id,
            Versioned {
                value: product,
                version,
            },
        );
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Committed-state reads
    // -----------------------------------------------------------------

    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.state.read().accounts.get(&id).map(|row| row.value.clone())
    }

    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.state.read().products.get(&id).map(|row| row.value.clone())
    }

    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.read().orders.get(&id).cloned()
    }

    /// All committed orders of a buyer, oldest first.
    #[must_use]
    pub fn orders_for_buyer(&self, buyer: AccountId) -> Vec<Order> {
        let state = self.state.read();
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.buyer == buyer)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        orders
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.read().orders.len()
    }

    /// Current global commit version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Sum of all account balances.
    #[must_use]
    pub fn total_balance(&self) -> Decimal {
        self.state
            .read()
            .accounts
            .values()
            .map(|row| row.value.balance)
            .sum()
    }

    /// Check money and stock conservation against what was deposited and listed.
    ///
    /// # Errors
    /// [`SettleError::ConservationViolation`] on the first mismatch found.
    pub fn verify_supply(&self) -> Result<()> {
        let state = self.state.read();
        let money: Decimal = state.accounts.values().map(|row| row.value.balance).sum();
        state.supply.verify_money(money)?;
        for product_id in state.supply.tracked_products() {
            let on_hand = state
                .products
                .get(&product_id)
                .map_or(0, |row| row.value.quantity);
            let sold = state
                .orders
                .values()
                .map(|order| order.quantity_of(product_id))
                .sum();
            state.supply.verify_stock(product_id, on_hand, sold)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            duplicate_keys: self.duplicate_keys.load(Ordering::Relaxed),
            business_aborts: self.business_aborts.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Begin a transaction for manual control. Prefer
    /// [`TransactionalStore::run_in_transaction`].
    #[must_use]
    pub fn begin(&self) -> MemoryTxn<'_> {
        MemoryTxn {
            ledger: self,
            accounts_read: HashMap::new(),
            products_read: HashMap::new(),
            keys_read: HashMap::new(),
            account_writes: HashMap::new(),
            product_writes: HashMap::new(),
            pending_orders: Vec::new(),
        }
    }

    fn record_outcome<T>(&self, result: &Result<T>) {
        let counter = match result {
            Ok(_) => &self.commits,
            Err(SettleError::Conflict { .. }) => &self.conflicts,
            Err(SettleError::DuplicateKey { .. }) => &self.duplicate_keys,
            Err(err) if err.is_business_rule() => &self.business_aborts,
            Err(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl TransactionalStore for MemoryLedger {
    fn run_in_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> Result<T>,
    {
        let mut txn = self.begin();
        let result = match body(&mut txn) {
            Ok(value) => txn.commit().map(|_| value),
            Err(err) if err.is_business_rule() => match txn.stale_read(&self.state.read()) {
                Some(reason) => Err(SettleError::Conflict { reason }),
                None => Err(err),
            },
            Err(err) => Err(err),
        };
        self.record_outcome(&result);
        result
    }
}

/// One optimistic transaction against a [`MemoryLedger`].
pub struct MemoryTxn<'a> {
    ledger: &'a MemoryLedger,
    accounts_read: HashMap<AccountId, (u64, Option<Account>)>,
    products_read: HashMap<ProductId, (u64, Option<Product>)>,
    keys_read: HashMap<OrderKey, (u64, Option<Order>)>,
    account_writes: HashMap<AccountId, Account>,
    product_writes: HashMap<ProductId, Product>,
    pending_orders: Vec<Order>,
}

impl MemoryTxn<'_> {
    /// Whether the transaction buffered no writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.account_writes.is_empty()
            && self.product_writes.is_empty()
            && self.pending_orders.is_empty()
    }

    /// Describe the first read whose version has moved, if any.
    fn stale_read(&self, state: &LedgerState) -> Option<String> {
        for (id, (seen, _)) in &self.accounts_read {
            let now = state.account_version(*id);
            if now != *seen {
                return Some(format!("{id} changed (read v{seen}, now v{now})"));
            }
        }
        for (id, (seen, _)) in &self.products_read {
            let now = state.product_version(*id);
            if now != *seen {
                return Some(format!("{id} changed (read v{seen}, now v{now})"));
            }
        }
        for (key, (seen, _)) in &self.keys_read {
            let now = state.key_version(key);
            if now != *seen {
                return Some(format!("order key {key} changed (read v{seen}, now v{now})"));
            }
        }
        None
    }

    /// Validate and apply. Returns the commit version.
    ///
    /// # Errors
    /// `DuplicateKey` if a pending order's key was taken since it was
    /// inserted, `Conflict` if any read is stale. Nothing is applied on error.
    pub fn commit(self) -> Result<u64> {
        let ledger = self.ledger;
        let mut state = ledger.state.write();

        for order in &self.pending_orders {
            if state.order_index.contains_key(&order.key()) {
                return Err(SettleError::DuplicateKey {
                    buyer: order.buyer,
                    token: order.request_token.clone(),
                });
            }
        }
        if let Some(reason) = self.stale_read(&state) {
            tracing::debug!(%reason, "Ledger commit rejected: stale read");
            return Err(SettleError::Conflict { reason });
        }
        if self.is_read_only() {
            return Ok(state.version);
        }

        let version = state.next_version();
        let MemoryTxn {
            account_writes,
            product_writes,
            pending_orders,
            ..
        } = self;
        let (accounts, products, orders) = (
            account_writes.len(),
            product_writes.len(),
            pending_orders.len(),
        );

        for (id, account) in account_writes {
            state.accounts.insert(
                id,
                Versioned {
                    value: account,
                    version,
                },
            );
        }
        for (id, product) in product_writes {
            state.products.insert(
                id,
                Versioned {
                    value: product,
                    version,
                },
            );
        }
        for order in pending_orders {
            state.order_index.insert(
                order.key(),
                Versioned {
                    value: order.id,
                    version,
                },
            );
            state.orders.insert(order.id, order);
        }

        tracing::debug!(version, accounts, products, orders, "Ledger commit");
        Ok(version)
    }
}

impl AccountLedger for MemoryTxn<'_> {
    fn account(&mut self, id: AccountId) -> Result<Option<Account>> {
        if let Some(written) = self.account_writes.get(&id) {
            return Ok(Some(written.clone()));
        }
        if let Some((_, seen)) = self.accounts_read.get(&id) {
            return Ok(seen.clone());
        }
        let (version, row) = {
            let state = self.ledger.state.read();
            state
                .accounts
                .get(&id)
                .map_or((0, None), |row| (row.version, Some(row.value.clone())))
        };
        self.accounts_read.insert(id, (version, row.clone()));
        Ok(row)
    }

    fn adjust_balance(&mut self, id: AccountId, delta: Decimal) -> Result<Account> {
        let mut account = self.account(id)?.ok_or(SettleError::AccountNotFound(id))?;
        let balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| SettleError::Internal(format!("balance overflow on {id}")))?;
        if balance < Decimal::ZERO {
            return Err(SettleError::BalanceUnderflow(id));
        }
        account.balance = balance;
        self.account_writes.insert(id, account.clone());
        Ok(account)
    }
}

impl ProductLedger for MemoryTxn<'_> {
    fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        if let Some(written) = self.product_writes.get(&id) {
            return Ok(Some(written.clone()));
        }
        if let Some((_, seen)) = self.products_read.get(&id) {
            return Ok(seen.clone());
        }
        let (version, row) = {
            let state = self.ledger.state.read();
            state
                .products
                .get(&id)
                .map_or((0, None), |row| (row.version, Some(row.value.clone())))
        };
        self.products_read.insert(id, (version, row.clone()));
        Ok(row)
    }

    fn adjust_quantity(&mut self, id: ProductId, delta: i64) -> Result<Product> {
        let mut product = self.product(id)?.ok_or(SettleError::ProductNotFound(id))?;
        product.quantity = product.quantity.checked_add_signed(delta).ok_or_else(|| {
            if delta < 0 {
                SettleError::StockUnderflow(id)
            } else {
                SettleError::Internal(format!("stock overflow on {id}"))
            }
        })?;
        self.product_writes.insert(id, product.clone());
        Ok(product)
    }
}

impl OrderLedger for MemoryTxn<'_> {
    fn find_order(&mut self, buyer: AccountId, token: &RequestToken) -> Result<Option<Order>> {
        if let Some(pending) = self
            .pending_orders
            .iter()
            .find(|order| order.buyer == buyer && &order.request_token == token)
        {
            return Ok(Some(pending.clone()));
        }
        let key = OrderKey::new(buyer, token.clone());
        if let Some((_, seen)) = self.keys_read.get(&key) {
            return Ok(seen.clone());
        }
        let (version, order) = {
            let state = self.ledger.state.read();
            match state.order_index.get(&key) {
                Some(slot) => (slot.version, state.orders.get(&slot.value).cloned()),
                None => (0, None),
            }
        };
        self.keys_read.insert(key, (version, order.clone()));
        Ok(order)
    }

    fn insert_order(&mut self, order: Order) -> Result<()> {
        let key = order.key();
        let taken = self.pending_orders.iter().any(|pending| pending.key() == key)
            || self.ledger.state.read().order_index.contains_key(&key);
        if taken {
            return Err(SettleError::DuplicateKey {
                buyer: order.buyer,
                token: order.request_token,
            });
        }
        self.pending_orders.push(order);
        Ok(())
    }
}
