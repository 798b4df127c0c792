//! # shopsettle-types
//!
//! Shared types, errors, and configuration for the **ShopSettle** order
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`ProductId`], [`OrderId`], [`RequestToken`], [`OrderKey`]
//! - **Ledger rows**: [`Account`], [`Product`]
//! - **Purchase model**: [`PurchaseLine`], [`PurchaseRequest`]
//! - **Order model**: [`Order`], [`SettledLine`]
//! - **Configuration**: [`SettlementConfig`], [`RetryConfig`]
//! - **Errors**: [`SettleError`] with `SS_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod account;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod order;
pub mod product;
pub mod purchase;

// Re-export all primary types at crate root for ergonomic imports:
//   use shopsettle_types::{Account, Product, PurchaseRequest, Order, ...};

pub use account::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use order::*;
pub use product::*;
pub use purchase::*;

// Constants are accessed via `shopsettle_types::constants::FOO`
// (not re-exported to avoid name collisions).
