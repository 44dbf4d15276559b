//! Error types for Clearswap.
//!
//! This module provides the error hierarchy shared by the whole workspace,
//! using `thiserror`. Every failure a lifecycle phase can hit maps onto
//! exactly one variant so callers can decide on retry policy themselves;
//! nothing in the core retries automatically.

use thiserror::Error;

/// Result type alias using `SwapError`.
pub type Result<T> = std::result::Result<T, SwapError>;

/// Main error type for all Clearswap operations.
#[derive(Debug, Error)]
pub enum SwapError {
    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSPORT ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transport unavailable or dropped mid-exchange. Retryable by reconnecting.
    #[error("connection error: {0}")]
    Connection(String),

    /// No matching response arrived within the request budget.
    #[error("request {id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The correlation id of the request that expired.
        id: u64,
        /// The budget that elapsed.
        timeout_ms: u64,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // PROTOCOL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Malformed or unexpected response shape from the remote node.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote node explicitly rejected the request.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Error code reported by the node.
        code: i64,
        /// Human-readable reason reported by the node.
        message: String,
    },

    /// A state update was submitted or accepted at an unexpected version.
    #[error("version conflict: expected {expected}, got {actual}")]
    VersionConflict {
        /// The version the controller computed (previous + 1).
        expected: u64,
        /// The version actually proposed or reported.
        actual: u64,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // CALLER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Operation attempted before the auth handshake succeeded.
    #[error("not authenticated with the clearnode")]
    NotAuthenticated,

    /// Unknown plan or session identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // LOCAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration error (missing or malformed environment).
    #[error("configuration error: {0}")]
    Config(String),

    /// Signing failed or the private key is unusable.
    #[error("signer error: {0}")]
    Signer(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl SwapError {
    /// Returns true if the caller may retry after reconnecting or re-issuing.
    ///
    /// Retry policy is entirely the caller's responsibility; this only
    /// classifies which failures are worth retrying at all.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SwapError::Connection(_) | SwapError::Timeout { .. })
    }

    /// Returns true if the fault lies with the caller's input.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SwapError::NotFound(_) | SwapError::Validation(_) | SwapError::NotAuthenticated
        )
    }
}
