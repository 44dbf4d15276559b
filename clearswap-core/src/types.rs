//! Domain types for Clearswap.
//!
//! Amounts are `U256` everywhere and cross the wire as decimal strings, so
//! no value is ever squeezed through a float or a 53-bit integer. Version
//! counters are plain `u64` monotonic integers.

use chrono::Utc;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SwapError};

/// Serde adapter for `U256` amounts as decimal strings.
pub mod amount {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a `U256` as a decimal string.
    pub fn serialize<S: Serializer>(value: &U256, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&value.to_string())
    }

    /// Deserializes a `U256` from a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<U256, D::Error> {
        let s = String::deserialize(de)?;
        U256::from_dec_str(s.trim()).map_err(serde::de::Error::custom)
    }
}

/// How value is distributed to one participant at a given session version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Destination address
    pub participant: String,
    /// Asset identifier (e.g. "ytest.usd")
    pub asset: String,
    /// Amount in the asset's smallest units
    #[serde(with = "amount")]
    pub amount: U256,
}

impl Allocation {
    /// Creates an allocation triple.
    pub fn new(participant: impl Into<String>, asset: impl Into<String>, amount: U256) -> Self {
        Self {
            participant: participant.into(),
            asset: asset.into(),
            amount,
        }
    }
}

/// One buyer's slice of the swap.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuyerFill {
    /// Buyer address
    pub buyer: String,
    /// Asset units this buyer purchases
    #[serde(with = "amount")]
    pub asset_amount: U256,
    /// Payment units this buyer owes
    #[serde(with = "amount")]
    pub payment_amount: U256,
}

/// A multi-party swap execution plan.
///
/// Immutable once created; the store removes it only when session creation
/// rolls back. Totals are computed from the fills at construction and
/// re-checked by [`ExecutionPlan::validate`] for plans built any other way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Plan identifier (UUID v4)
    pub id: String,
    /// Seller address (disposes of the full asset amount)
    pub seller: String,
    /// Liquidity provider address
    pub provider: String,
    /// Buyer fills, in submission order
    pub fills: Vec<BuyerFill>,
    /// Asset being sold
    pub asset: String,
    /// Asset the buyers pay in
    pub payment_asset: String,
    /// Total asset units sold
    #[serde(with = "amount")]
    pub total_asset: U256,
    /// Total payment units owed by buyers
    #[serde(with = "amount")]
    pub total_payment: U256,
    /// Provider fee, denominated in the payment asset
    #[serde(with = "amount")]
    pub provider_fee: U256,
    /// Creation time, epoch seconds
    pub created_at: i64,
}

impl ExecutionPlan {
    /// Builds a plan from its parts, computing totals from the fills.
    pub fn new(
        seller: impl Into<String>,
        provider: impl Into<String>,
        fills: Vec<BuyerFill>,
        asset: impl Into<String>,
        payment_asset: impl Into<String>,
        provider_fee: U256,
    ) -> Result<Self> {
        let mut total_asset = U256::zero();
        let mut total_payment = U256::zero();
        for fill in &fills {
            total_asset = total_asset
                .checked_add(fill.asset_amount)
                .ok_or_else(|| SwapError::Validation("asset total overflows".into()))?;
            total_payment = total_payment
                .checked_add(fill.payment_amount)
                .ok_or_else(|| SwapError::Validation("payment total overflows".into()))?;
        }

        let plan = Self {
            id: Uuid::new_v4().to_string(),
            seller: seller.into(),
            provider: provider.into(),
            fills,
            asset: asset.into(),
            payment_asset: payment_asset.into(),
            total_asset,
            total_payment,
            provider_fee,
            created_at: Utc::now().timestamp(),
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Participant list in protocol order: seller, provider, then buyers.
    ///
    /// The order is load-bearing: weights and allocations index into it.
    pub fn participants(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(2 + self.fills.len());
        out.push(self.seller.clone());
        out.push(self.provider.clone());
        out.extend(self.fills.iter().map(|f| f.buyer.clone()));
        out
    }

    /// Checks internal consistency.
    ///
    /// Rejects empty participant fields, empty or duplicate participants,
    /// a zero-size swap, and totals that disagree with the fill sums.
    pub fn validate(&self) -> Result<()> {
        if self.seller.is_empty() || self.provider.is_empty() {
            return Err(SwapError::Validation(
                "seller and provider addresses are required".into(),
            ));
        }
        if self.asset.is_empty() || self.payment_asset.is_empty() {
            return Err(SwapError::Validation("asset identifiers are required".into()));
        }
        if self.asset == self.payment_asset {
            return Err(SwapError::Validation(
                "asset and payment asset must differ".into(),
            ));
        }
        if self.fills.is_empty() {
            return Err(SwapError::Validation("at least one buyer is required".into()));
        }
        if self.fills.iter().any(|f| f.buyer.is_empty()) {
            return Err(SwapError::Validation("buyer addresses are required".into()));
        }

        let participants = self.participants();
        let mut seen = std::collections::HashSet::with_capacity(participants.len());
        for p in &participants {
            if !seen.insert(p.as_str()) {
                return Err(SwapError::Validation(format!(
                    "duplicate participant: {p}"
                )));
            }
        }

        let mut asset_sum = U256::zero();
        let mut payment_sum = U256::zero();
        for fill in &self.fills {
            asset_sum = asset_sum
                .checked_add(fill.asset_amount)
                .ok_or_else(|| SwapError::Validation("asset total overflows".into()))?;
            payment_sum = payment_sum
                .checked_add(fill.payment_amount)
                .ok_or_else(|| SwapError::Validation("payment total overflows".into()))?;
        }
        if asset_sum != self.total_asset {
            return Err(SwapError::Validation(format!(
                "fill asset amounts sum to {asset_sum}, plan says {}",
                self.total_asset
            )));
        }
        if payment_sum != self.total_payment {
            return Err(SwapError::Validation(format!(
                "fill payment amounts sum to {payment_sum}, plan says {}",
                self.total_payment
            )));
        }
        if self.total_asset.is_zero() {
            return Err(SwapError::Validation("swap has zero asset volume".into()));
        }
        Ok(())
    }
}

/// One asset balance on the node's off-chain ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    /// Asset identifier
    pub asset: String,
    /// Balance in smallest units
    #[serde(with = "amount")]
    pub amount: U256,
}

/// Lifecycle status of a swap session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Plan accepted, remote session not yet created
    Pending,
    /// Remote session created
    Created,
    /// Lock-phase allocations accepted
    Locked,
    /// Final allocations accepted
    Finalized,
    /// Session closed; remote node settles on-chain
    Closed,
    /// A phase failed; the error is preserved on the binding
    Failed,
}

impl SessionStatus {
    /// Returns true for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Failed)
    }
}

/// Semantic tag on a state-update submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateIntent {
    /// Redistribute within already-locked totals; the sum never changes
    Operate,
    /// Add funds to the session total
    Deposit,
    /// Remove funds from the session total
    Withdraw,
}

/// Local mirror of the remote session bound to one execution plan.
///
/// Authoritative state lives on the remote node; this cache tracks the
/// opaque session id, the last accepted version, and the phase status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionBinding {
    /// Opaque identifier issued by the remote node
    pub session_id: String,
    /// Participants in protocol order
    pub participants: Vec<String>,
    /// Last accepted state version; increases by exactly one per round
    pub version: u64,
    /// Current phase status
    pub status: SessionStatus,
    /// Allocations at the last accepted version
    pub allocations: Vec<Allocation>,
    /// Error message from the failing phase, if any
    pub last_error: Option<String>,
}

impl SessionBinding {
    /// Creates a binding for a freshly created remote session.
    pub fn created(
        session_id: impl Into<String>,
        participants: Vec<String>,
        version: u64,
        allocations: Vec<Allocation>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            participants,
            version,
            status: SessionStatus::Created,
            allocations,
            last_error: None,
        }
    }
}
