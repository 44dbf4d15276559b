//! Execution plan store.
//!
//! In-memory keyed registry of execution plans and their remote session
//! bindings. Thread-safe without external synchronization: plans are
//! inserted whole, so a concurrent lookup either sees the complete plan or
//! nothing. An insertion-order index preserves listing order.

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use clearswap_core::error::{Result, SwapError};
use clearswap_core::types::{ExecutionPlan, SessionBinding, SessionStatus};

/// In-memory plan registry with session bindings.
#[derive(Debug, Default)]
pub struct PlanStore {
    /// Primary storage: plan id -> plan
    plans: DashMap<String, ExecutionPlan>,
    /// Insertion order for listing
    order: RwLock<Vec<String>>,
    /// Plan id -> remote session binding
    bindings: DashMap<String, SessionBinding>,
}

impl PlanStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored plans.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// True if no plans are stored.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Inserts a validated plan.
    ///
    /// Rejects duplicates and plans that fail their own consistency check.
    pub fn create(&self, plan: ExecutionPlan) -> Result<()> {
        plan.validate()?;
        if self.plans.contains_key(&plan.id) {
            return Err(SwapError::Validation(format!(
                "plan {} already exists",
                plan.id
            )));
        }
        let id = plan.id.clone();
        debug!(plan_id = %id, buyers = plan.fills.len(), "storing execution plan");
        self.plans.insert(id.clone(), plan);
        self.order.write().push(id);
        Ok(())
    }

    /// Fetches a plan by id.
    pub fn get(&self, id: &str) -> Result<ExecutionPlan> {
        self.plans
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| SwapError::NotFound(format!("plan {id}")))
    }

    /// All plans in insertion order.
    pub fn list(&self) -> Vec<ExecutionPlan> {
        let order = self.order.read();
        order
            .iter()
            .filter_map(|id| self.plans.get(id).map(|entry| entry.clone()))
            .collect()
    }

    /// Removes a plan and its binding, returning the plan.
    ///
    /// Used by session-creation rollback; plans are otherwise never deleted.
    pub fn remove(&self, id: &str) -> Result<ExecutionPlan> {
        let (_, plan) = self
            .plans
            .remove(id)
            .ok_or_else(|| SwapError::NotFound(format!("plan {id}")))?;
        self.order.write().retain(|entry| entry != id);
        self.bindings.remove(id);
        debug!(plan_id = %id, "removed execution plan");
        Ok(plan)
    }

    /// Attaches a session binding to a stored plan.
    pub fn bind(&self, plan_id: &str, binding: SessionBinding) {
        self.bindings.insert(plan_id.into(), binding);
    }

    /// Fetches the session binding for a plan.
    pub fn binding(&self, plan_id: &str) -> Result<SessionBinding> {
        self.bindings
            .get(plan_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| SwapError::NotFound(format!("session for plan {plan_id}")))
    }

    /// Applies a mutation to a plan's binding.
    pub fn update_binding(
        &self,
        plan_id: &str,
        f: impl FnOnce(&mut SessionBinding),
    ) -> Result<SessionBinding> {
        let mut entry = self
            .bindings
            .get_mut(plan_id)
            .ok_or_else(|| SwapError::NotFound(format!("session for plan {plan_id}")))?;
        f(entry.value_mut());
        Ok(entry.clone())
    }

    /// Marks a plan's session failed, preserving the error for inspection.
    pub fn mark_failed(&self, plan_id: &str, error: &str) {
        if let Some(mut entry) = self.bindings.get_mut(plan_id) {
            entry.status = SessionStatus::Failed;
            entry.last_error = Some(error.into());
        }
    }
}
