//! # Clearswap Client
//!
//! Authenticated client for the remote coordination node ("clearnode").
//!
//! The clearnode speaks JSON frames over one persistent WebSocket. This
//! crate turns that duplex stream into a pseudo-synchronous API:
//!
//! - [`Correlator`] owns the connection and matches inbound response
//!   frames to pending requests by numeric identifier
//! - [`AuthHandshake`] drives the two-step challenge/response
//!   authentication sequence over the correlator
//! - [`ClearnodeClient`] composes both with a [`SignerAdapter`] and
//!   exposes the signed, session-authenticated RPC surface
//!
//! ## Example
//!
//! ```rust,ignore
//! use clearswap_client::{ClearnodeClient, SignerAdapter};
//! use clearswap_core::ClearnodeConfig;
//!
//! let signer = SignerAdapter::from_private_key(&key)?;
//! let client = ClearnodeClient::new(ClearnodeConfig::default(), signer);
//! client.connect().await?;
//! client.authenticate().await?;
//! let balances = client.ledger_balances().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod auth;
pub mod client;
pub mod correlator;
pub mod rpc;
pub mod signer;

pub use auth::{AuthHandshake, AuthSession, AuthState};
pub use client::{ClearnodeClient, CreatedSession};
pub use correlator::{ConnectionState, Correlator};
pub use rpc::{InboundFrame, RpcRequest, RpcResponse};
pub use signer::SignerAdapter;
