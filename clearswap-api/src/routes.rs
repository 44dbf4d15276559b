//! API route configuration.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Swap lifecycle
        .route("/api/v1/swaps", post(handlers::create_swap))
        .route("/api/v1/swaps", get(handlers::list_swaps))
        .route("/api/v1/swaps/:id", get(handlers::get_swap))
        .route("/api/v1/swaps/:id/lock", post(handlers::lock_swap))
        .route("/api/v1/swaps/:id/finalize", post(handlers::finalize_swap))
        .route("/api/v1/swaps/:id/close", post(handlers::close_swap))
        // Ledger
        .route("/api/v1/ledger/balances", get(handlers::ledger_balances))
        .with_state(state)
}
