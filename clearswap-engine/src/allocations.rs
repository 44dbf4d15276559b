//! Allocation algebra.
//!
//! Pure functions deriving per-phase allocations from an execution plan.
//! The invariant they uphold: per asset, every phase's allocation total
//! equals the locked total. On the asset side that is the full asset
//! amount; on the payment side it is the buyers' total payment plus the
//! provider fee, which the provider posts at lock and receives back at
//! finalize.

use std::collections::BTreeMap;

use ethers::types::U256;

use clearswap_core::error::{Result, SwapError};
use clearswap_core::types::{Allocation, ExecutionPlan};

/// Lock-phase allocations.
///
/// The seller locks the full asset amount; the provider posts its fee and
/// each buyer locks its payment amount, all on the payment side.
pub fn lock_allocations(plan: &ExecutionPlan) -> Vec<Allocation> {
    let mut out = Vec::with_capacity(plan.fills.len() + 2);
    out.push(Allocation::new(&plan.seller, &plan.asset, plan.total_asset));
    out.push(Allocation::new(
        &plan.provider,
        &plan.payment_asset,
        plan.provider_fee,
    ));
    for fill in &plan.fills {
        out.push(Allocation::new(
            &fill.buyer,
            &plan.payment_asset,
            fill.payment_amount,
        ));
    }
    out
}

/// Final net allocations.
///
/// The seller receives the total payment, the provider receives its fee,
/// and each buyer receives its purchased asset slice with zero payment
/// remaining (zero entries are omitted from the frame).
pub fn final_allocations(plan: &ExecutionPlan) -> Vec<Allocation> {
    let mut out = Vec::with_capacity(plan.fills.len() + 2);
    out.push(Allocation::new(
        &plan.seller,
        &plan.payment_asset,
        plan.total_payment,
    ));
    out.push(Allocation::new(
        &plan.provider,
        &plan.payment_asset,
        plan.provider_fee,
    ));
    for fill in &plan.fills {
        out.push(Allocation::new(&fill.buyer, &plan.asset, fill.asset_amount));
    }
    out
}

/// Sums allocation amounts per asset.
pub fn totals_per_asset(allocations: &[Allocation]) -> Result<BTreeMap<String, U256>> {
    let mut totals: BTreeMap<String, U256> = BTreeMap::new();
    for alloc in allocations {
        let entry = totals.entry(alloc.asset.clone()).or_insert_with(U256::zero);
        *entry = entry
            .checked_add(alloc.amount)
            .ok_or_else(|| SwapError::Validation(format!("{} total overflows", alloc.asset)))?;
    }
    Ok(totals)
}

/// Verifies that two allocation sets conserve value per asset.
///
/// Called before every state submission so an inconsistent total can never
/// reach the wire.
pub fn check_conservation(previous: &[Allocation], next: &[Allocation]) -> Result<()> {
    let before = totals_per_asset(previous)?;
    let after = totals_per_asset(next)?;
    if before != after {
        return Err(SwapError::Validation(format!(
            "allocation totals drifted: {before:?} -> {after:?}"
        )));
    }
    Ok(())
}
