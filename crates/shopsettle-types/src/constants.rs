//! System-wide constants for the ShopSettle settlement engine.

/// Default number of conflict retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default base delay for exponential retry backoff, in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1;

/// Default cap on a single retry delay, in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 50;

/// Maximum number of distinct purchase lines in one request (default).
pub const DEFAULT_MAX_PURCHASE_LINES: usize = 1_000;

/// Maximum length of a request token in bytes.
pub const MAX_REQUEST_TOKEN_LEN: usize = 255;

/// Domain separator for purchase request digests.
pub const PURCHASE_DIGEST_DOMAIN: &[u8] = b"shopsettle:purchase:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "ShopSettle";
