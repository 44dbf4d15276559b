//! DTOs for API requests and responses.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use clearswap_core::types::{amount, BuyerFill, ExecutionPlan, LedgerBalance, SessionBinding};

/// Success envelope: `{"success": true, "result": ..}`.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    /// Always true on this path
    pub success: bool,
    /// The result payload
    pub result: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wraps a result payload.
    pub fn ok(result: T) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            result,
        })
    }
}

/// Request to create a swap.
#[derive(Debug, Deserialize)]
pub struct CreateSwapRequest {
    /// Seller address
    pub seller: String,
    /// Provider address
    pub provider: String,
    /// Buyer fills; amounts are decimal strings
    pub fills: Vec<BuyerFill>,
    /// Asset being sold
    pub asset: String,
    /// Asset the buyers pay in
    pub payment_asset: String,
    /// Provider fee in the payment asset (decimal string)
    #[serde(with = "amount")]
    pub provider_fee: U256,
    /// Optional per-participant weights, in participant order
    pub weights: Option<Vec<u64>>,
}

/// A plan together with its session binding, if one exists.
#[derive(Serialize)]
pub struct SwapDto {
    /// The execution plan
    pub plan: ExecutionPlan,
    /// The remote session binding (absent before creation completes)
    pub session: Option<SessionBinding>,
}

/// Response for the ledger balances query.
#[derive(Serialize)]
pub struct BalancesDto {
    /// Balances per asset
    pub balances: Vec<LedgerBalance>,
}

/// Response for the health check.
#[derive(Serialize)]
pub struct HealthDto {
    /// Always "ok" when the server answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since first health probe
    pub uptime_seconds: u64,
    /// Whether the clearnode session is authenticated
    pub authenticated: bool,
    /// Number of stored plans
    pub plans_count: usize,
}
