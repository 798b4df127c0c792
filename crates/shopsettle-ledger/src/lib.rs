//! # shopsettle-ledger
//!
//! The storage boundary consumed by the settlement engine.
//!
//! ## Interfaces
//!
//! - [`AccountLedger`], [`ProductLedger`], [`OrderLedger`]: row reads and
//!   conditional writes, only ever called inside a transaction
//! - [`LedgerTxn`]: all three, as seen by one transaction body
//! - [`TransactionalStore`]: the transaction boundary; surfaces
//!   [`SettleError::Conflict`](shopsettle_types::SettleError::Conflict) on
//!   serialization failure and
//!   [`SettleError::DuplicateKey`](shopsettle_types::SettleError::DuplicateKey)
//!   when the `(buyer, token)` unique index rejects an order
//!
//! ## Reference store
//!
//! [`MemoryLedger`] implements the boundary in memory with optimistic,
//! serializable transactions: versioned rows, a recorded read set,
//! buffered writes, and first-committer-wins validation at commit.

pub mod memory;
pub mod supply;
pub mod traits;

pub use memory::{LedgerStats, MemoryLedger, MemoryTxn};
pub use supply::SupplyConservation;
pub use traits::{AccountLedger, LedgerTxn, OrderLedger, ProductLedger, TransactionalStore};
