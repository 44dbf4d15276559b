//! Protocol constants for Clearswap.

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST BUDGETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default budget for one correlated request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 20_000;

/// Budget for opening the underlying WebSocket transport.
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// AUTH SESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifetime of an authenticated session, in seconds.
pub const SESSION_TTL_SECS: u64 = 3_600;

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION SESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol tag sent in every session definition.
pub const APP_PROTOCOL: &str = "clearswap-rpc-v1";

/// Default per-participant weight when the caller specifies none.
pub const DEFAULT_WEIGHT: u64 = 1;
