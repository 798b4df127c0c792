//! Error types for the ShopSettle settlement engine.
//!
//! All errors use the `SS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Request / input errors
//! - 2xx: Account errors
//! - 3xx: Product errors
//! - 6xx: Store / transaction errors
//! - 8xx: Safety invariant errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountId, ProductId, RequestToken};

/// Central error enum for all ShopSettle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    // =================================================================
    // Request Errors (1xx)
    // =================================================================
    /// The purchase request is malformed (missing token, empty lines, ...).
    #[error("SS_ERR_100: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// An account row failed validation on creation.
    #[error("SS_ERR_101: Invalid account: {reason}")]
    InvalidAccount { reason: String },

    /// A product row failed validation on creation.
    #[error("SS_ERR_102: Invalid product: {reason}")]
    InvalidProduct { reason: String },

    // =================================================================
    // Account Errors (2xx)
    // =================================================================
    /// The buyer of a purchase request does not exist.
    #[error("SS_ERR_200: Buyer not found: {0}")]
    BuyerNotFound(AccountId),

    /// An account referenced by a ledger write does not exist.
    #[error("SS_ERR_201: Account not found: {0}")]
    AccountNotFound(AccountId),

    /// The buyer cannot cover the total cost.
    #[error("SS_ERR_202: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A balance write would leave the account negative.
    #[error("SS_ERR_203: Balance underflow on {0}")]
    BalanceUnderflow(AccountId),

    // =================================================================
    // Product Errors (3xx)
    // =================================================================
    /// A purchased product does not exist.
    #[error("SS_ERR_300: Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds the stock on hand.
    #[error("SS_ERR_301: Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u64,
    },

    /// A quantity write would leave the product stock negative.
    #[error("SS_ERR_302: Stock underflow on {0}")]
    StockUnderflow(ProductId),

    // =================================================================
    // Store / Transaction Errors (6xx)
    // =================================================================
    /// Serialization failure: the transaction read data that another
    /// transaction changed before it could commit. Always retryable.
    #[error("SS_ERR_600: Transaction conflict: {reason}")]
    Conflict { reason: String },

    /// An order for this `(buyer, token)` already exists.
    #[error("SS_ERR_601: Duplicate order key: buyer {buyer}, token {token}")]
    DuplicateKey { buyer: AccountId, token: RequestToken },

    /// The bounded retry policy gave up on a conflicting transaction.
    #[error("SS_ERR_602: Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    // =================================================================
    // Safety Errors (8xx)
    // =================================================================
    /// Money or stock conservation invariant violated. Critical.
    #[error("SS_ERR_800: Conservation invariant violation: {reason}")]
    ConservationViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config document, bad limits, etc.).
    #[error("SS_ERR_901: Configuration error: {0}")]
    Configuration(String),
}

impl SettleError {
    /// Shorthand for [`SettleError::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`SettleError::Conflict`].
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// The store detected a serialization failure; the attempt may be re-run.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Malformed input, distinguishable from business-rule outcomes.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    /// A final business outcome decided against ledger state.
    #[must_use]
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::BuyerNotFound(_)
                | Self::ProductNotFound(_)
                | Self::InsufficientStock { .. }
                | Self::InsufficientBalance { .. }
        )
    }

    /// The `SS_ERR_` code of this error, e.g. `"SS_ERR_301"`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "SS_ERR_100",
            Self::InvalidAccount { .. } => "SS_ERR_101",
            Self::InvalidProduct { .. } => "SS_ERR_102",
            Self::BuyerNotFound(_) => "SS_ERR_200",
            Self::AccountNotFound(_) => "SS_ERR_201",
            Self::InsufficientBalance { .. } => "SS_ERR_202",
            Self::BalanceUnderflow(_) => "SS_ERR_203",
            Self::ProductNotFound(_) => "SS_ERR_300",
            Self::InsufficientStock { .. } => "SS_ERR_301",
            Self::StockUnderflow(_) => "SS_ERR_302",
            Self::Conflict { .. } => "SS_ERR_600",
            Self::DuplicateKey { .. } => "SS_ERR_601",
            Self::RetriesExhausted { .. } => "SS_ERR_602",
            Self::ConservationViolation { .. } => "SS_ERR_800",
            Self::Internal(_) => "SS_ERR_900",
            Self::Configuration(_) => "SS_ERR_901",
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SettleError>;
