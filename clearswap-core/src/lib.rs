//! # Clearswap Core
//!
//! Core types, errors, and configuration for the Clearswap relay.
//!
//! This crate provides the foundational building blocks used by all other
//! Clearswap crates:
//!
//! - **Types**: Execution plans, allocations, session status and bindings
//! - **Errors**: The `SwapError` taxonomy shared across the workspace
//! - **Constants**: Protocol timeouts and defaults
//! - **Config**: Environment-driven relay configuration
//!
//! ## Example
//!
//! ```rust
//! use clearswap_core::{Allocation, SessionStatus};
//! use ethers::types::U256;
//!
//! let alloc = Allocation::new("0xseller", "usdc", U256::from(100u64));
//! let json = serde_json::to_string(&alloc).unwrap();
//! assert!(json.contains("\"100\""));
//! assert!(!SessionStatus::Created.is_terminal());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{ClearnodeConfig, RelayConfig};
pub use constants::*;
pub use error::{Result, SwapError};
pub use types::*;
