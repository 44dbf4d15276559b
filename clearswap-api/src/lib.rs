//! # Clearswap API Server
//!
//! REST API over the swap session lifecycle, designed to be consumed by a
//! web frontend or curl.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/swaps` - Create a plan and its remote session
//! - `POST /api/v1/swaps/:id/lock` - Lock phase
//! - `POST /api/v1/swaps/:id/finalize` - Finalize phase
//! - `POST /api/v1/swaps/:id/close` - Close and settle
//! - `GET  /api/v1/swaps/:id` - Plan and session status
//! - `GET  /api/v1/swaps` - All plans in insertion order
//! - `GET  /api/v1/ledger/balances` - Off-chain ledger balances
//! - `GET  /health` - Uptime, auth state, plan count
//!
//! Every response is `{"success": ..}` with either a `result` payload or
//! an `error` message.
//!
//! ## Example
//!
//! ```rust,ignore
//! use clearswap_api::ApiServer;
//!
//! let server = ApiServer::new(state);
//! server.run(([0, 0, 0, 0], 3100)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod dto;
mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server for the Clearswap relay.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a new API server over the given state.
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Creates the router with all routes and layers configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the server on the given address.
    pub async fn run(self, addr: impl Into<SocketAddr>) -> std::io::Result<()> {
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("clearswap API listening on {}", addr);

        axum::serve(listener, self.router()).await
    }
}
