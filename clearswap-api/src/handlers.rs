//! API route handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use clearswap_core::types::ExecutionPlan;

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

/// POST /api/v1/swaps
///
/// Builds an execution plan from the request, creates the remote session,
/// and returns both. A rejected creation leaves no plan behind.
pub async fn create_swap(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSwapRequest>,
) -> Result<Json<ApiResponse<SwapDto>>> {
    state.ensure_authenticated()?;

    let plan = ExecutionPlan::new(
        req.seller,
        req.provider,
        req.fills,
        req.asset,
        req.payment_asset,
        req.provider_fee,
    )
    .map_err(ApiError::from)?;

    info!(
        plan_id = %plan.id,
        buyers = plan.fills.len(),
        total_asset = %plan.total_asset,
        "creating swap session"
    );

    let snapshot = plan.clone();
    let binding = state
        .lifecycle
        .create_swap_session(plan, req.weights)
        .await?;

    Ok(ApiResponse::ok(SwapDto {
        plan: snapshot,
        session: Some(binding),
    }))
}

/// POST /api/v1/swaps/:id/lock
pub async fn lock_swap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SwapDto>>> {
    state.ensure_authenticated()?;
    let binding = state.lifecycle.lock_funds(&id).await?;
    let plan = state.lifecycle.store().get(&id)?;
    Ok(ApiResponse::ok(SwapDto {
        plan,
        session: Some(binding),
    }))
}

/// POST /api/v1/swaps/:id/finalize
pub async fn finalize_swap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SwapDto>>> {
    state.ensure_authenticated()?;
    let binding = state.lifecycle.finalize_swap(&id).await?;
    let plan = state.lifecycle.store().get(&id)?;
    Ok(ApiResponse::ok(SwapDto {
        plan,
        session: Some(binding),
    }))
}

/// POST /api/v1/swaps/:id/close
pub async fn close_swap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SwapDto>>> {
    state.ensure_authenticated()?;
    let binding = state.lifecycle.close_swap_session(&id).await?;
    let plan = state.lifecycle.store().get(&id)?;
    Ok(ApiResponse::ok(SwapDto {
        plan,
        session: Some(binding),
    }))
}

/// GET /api/v1/swaps/:id
pub async fn get_swap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SwapDto>>> {
    let plan = state.lifecycle.store().get(&id)?;
    let session = state.lifecycle.store().binding(&id).ok();
    Ok(ApiResponse::ok(SwapDto { plan, session }))
}

/// GET /api/v1/swaps
pub async fn list_swaps(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<SwapDto>>>> {
    let store = state.lifecycle.store();
    let swaps = store
        .list()
        .into_iter()
        .map(|plan| {
            let session = store.binding(&plan.id).ok();
            SwapDto { plan, session }
        })
        .collect();
    Ok(ApiResponse::ok(swaps))
}

/// GET /api/v1/ledger/balances
pub async fn ledger_balances(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<BalancesDto>>> {
    state.ensure_authenticated()?;
    let balances = state.lifecycle.ledger_balances().await?;
    Ok(ApiResponse::ok(BalancesDto { balances }))
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    let start = START_TIME.get_or_init(Instant::now);

    Json(HealthDto {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: start.elapsed().as_secs(),
        authenticated: state.lifecycle.is_authenticated(),
        plans_count: state.lifecycle.store().len(),
    })
}
