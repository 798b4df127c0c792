//! # shopsettle-settlement
//!
//! **Settlement engine**: turns a purchase request into exactly one durable
//! order per `(buyer, token)`, moving money from buyer to sellers and
//! stock out of products atomically.
//!
//! ## Architecture
//!
//! [`SettlementEngine::create_order`]:
//! 1. Validates the request (fail fast, no ledger access)
//! 2. Hands the transactional body to the [`ConflictRetryDriver`]
//! 3. Each attempt: idempotency check → reads → business rules →
//!    [`MoneyFlow`] check → writes → order insert → commit
//! 4. A `DuplicateKey` from the store's unique index is absorbed into the
//!    order that won the race
//!
//! ## Guarantees
//!
//! - Money conservation: buyer debit == Σ seller credits == order total
//! - Stock and balances never go negative at a committed state
//! - Business-rule failures are final and reported against a consistent
//!   snapshot; conflicts are retried and never surface unless retries run out

pub mod engine;
pub mod idempotency;
pub mod money_flow;
pub mod retry;

pub use engine::{SettlementEngine, SettlementOutcome};
pub use money_flow::MoneyFlow;
pub use retry::ConflictRetryDriver;
