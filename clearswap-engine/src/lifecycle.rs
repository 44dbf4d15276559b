//! Session lifecycle controller.
//!
//! Drives one execution plan through `Pending -> Created -> Locked ->
//! Finalized -> Closed`, with `Failed` reachable from any non-terminal
//! state. Phases run strictly sequentially - each awaits the node's accept
//! before the next is issued, because every phase's allocations hang off
//! the previously accepted version.
//!
//! Failure semantics: a create failure rolls the plan back out of the
//! store; a lock/finalize/close failure marks the binding `Failed` with
//! the error preserved and re-throws. Retries are the caller's decision,
//! never automatic.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use clearswap_client::{ClearnodeClient, CreatedSession};
use clearswap_core::constants::DEFAULT_WEIGHT;
use clearswap_core::error::{Result, SwapError};
use clearswap_core::types::{
    Allocation, ExecutionPlan, LedgerBalance, SessionBinding, SessionStatus, StateIntent,
};

use crate::allocations::{check_conservation, final_allocations, lock_allocations};
use crate::store::PlanStore;

/// The clearnode operations the lifecycle controller needs.
///
/// `ClearnodeClient` is the production implementation; tests substitute
/// their own.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// True when the auth handshake has completed and is unexpired.
    fn is_authenticated(&self) -> bool;

    /// Creates a multi-party application session.
    async fn create_session(
        &self,
        participants: &[String],
        weights: &[u64],
        quorum: u64,
        allocations: &[Allocation],
    ) -> Result<CreatedSession>;

    /// Submits a state update; returns the version the node accepted.
    async fn submit_state(
        &self,
        session_id: &str,
        intent: StateIntent,
        version: u64,
        allocations: &[Allocation],
    ) -> Result<u64>;

    /// Closes the session with its final allocations.
    async fn close_session(&self, session_id: &str, allocations: &[Allocation]) -> Result<()>;

    /// Queries the off-chain ledger balances.
    async fn ledger_balances(&self) -> Result<Vec<LedgerBalance>>;
}

#[async_trait]
impl SessionBackend for ClearnodeClient {
    fn is_authenticated(&self) -> bool {
        ClearnodeClient::is_authenticated(self)
    }

    async fn create_session(
        &self,
        participants: &[String],
        weights: &[u64],
        quorum: u64,
        allocations: &[Allocation],
    ) -> Result<CreatedSession> {
        self.create_app_session(participants, weights, quorum, allocations)
            .await
    }

    async fn submit_state(
        &self,
        session_id: &str,
        intent: StateIntent,
        version: u64,
        allocations: &[Allocation],
    ) -> Result<u64> {
        self.submit_app_state(session_id, intent, version, allocations)
            .await
    }

    async fn close_session(&self, session_id: &str, allocations: &[Allocation]) -> Result<()> {
        self.close_app_session(session_id, allocations).await
    }

    async fn ledger_balances(&self) -> Result<Vec<LedgerBalance>> {
        ClearnodeClient::ledger_balances(self).await
    }
}

/// Rejects any proposed version the controller did not compute as
/// previous + 1. Runs before anything touches the wire.
pub fn ensure_next_version(current: u64, proposed: u64) -> Result<()> {
    let expected = current + 1;
    if proposed != expected {
        return Err(SwapError::VersionConflict {
            expected,
            actual: proposed,
        });
    }
    Ok(())
}

/// Drives swap sessions through their four phases.
pub struct SessionLifecycle {
    backend: Arc<dyn SessionBackend>,
    store: Arc<PlanStore>,
}

impl SessionLifecycle {
    /// Creates a controller over the given backend and store.
    pub fn new(backend: Arc<dyn SessionBackend>, store: Arc<PlanStore>) -> Self {
        Self { backend, store }
    }

    /// The plan store.
    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    /// True when the backend holds an authenticated session.
    pub fn is_authenticated(&self) -> bool {
        self.backend.is_authenticated()
    }

    /// Queries the backend's ledger balances.
    pub async fn ledger_balances(&self) -> Result<Vec<LedgerBalance>> {
        self.backend.ledger_balances().await
    }

    /// Phase 1: stores the plan and creates the remote session.
    ///
    /// Participants are `[seller, provider, buyers..]` in that fixed order.
    /// Weights default to 1 each; quorum is the participant count, so every
    /// participant must approve each update. On any failure the plan is
    /// rolled back out of the store before the error is re-thrown.
    pub async fn create_swap_session(
        &self,
        plan: ExecutionPlan,
        weights: Option<Vec<u64>>,
    ) -> Result<SessionBinding> {
        plan.validate()?;
        let participants = plan.participants();
        let weights = match weights {
            Some(w) if w.len() != participants.len() => {
                return Err(SwapError::Validation(format!(
                    "{} weights for {} participants",
                    w.len(),
                    participants.len()
                )));
            }
            Some(w) => w,
            None => vec![DEFAULT_WEIGHT; participants.len()],
        };
        let quorum = participants.len() as u64;
        let lock = lock_allocations(&plan);
        let plan_id = plan.id.clone();

        self.store.create(plan)?;

        match self
            .backend
            .create_session(&participants, &weights, quorum, &lock)
            .await
        {
            Ok(created) => {
                info!(
                    plan_id = %plan_id,
                    session_id = %created.session_id,
                    participants = participants.len(),
                    "swap session created"
                );
                let binding =
                    SessionBinding::created(created.session_id, participants, created.version, lock);
                self.store.bind(&plan_id, binding.clone());
                Ok(binding)
            }
            Err(err) => {
                // A plan without a session must not linger in the store.
                let _ = self.store.remove(&plan_id);
                warn!(plan_id = %plan_id, error = %err, "session creation failed, plan rolled back");
                Err(err)
            }
        }
    }

    /// Phase 2: submits the lock allocations at version previous + 1.
    pub async fn lock_funds(&self, plan_id: &str) -> Result<SessionBinding> {
        let binding = self.store.binding(plan_id)?;
        self.lock_funds_at(plan_id, binding.version + 1).await
    }

    /// Lock phase at an explicit version, for callers that track versions
    /// themselves. Anything but previous + 1 is rejected locally.
    pub async fn lock_funds_at(&self, plan_id: &str, proposed: u64) -> Result<SessionBinding> {
        let plan = self.store.get(plan_id)?;
        let binding = self.store.binding(plan_id)?;
        require_status(&binding, SessionStatus::Created, "lock")?;

        let allocations = lock_allocations(&plan);
        check_conservation(&binding.allocations, &allocations)?;
        self.submit_phase(plan_id, &binding, proposed, allocations, SessionStatus::Locked)
            .await
    }

    /// Phase 3: submits the final net allocations at version previous + 1.
    pub async fn finalize_swap(&self, plan_id: &str) -> Result<SessionBinding> {
        let binding = self.store.binding(plan_id)?;
        self.finalize_swap_at(plan_id, binding.version + 1).await
    }

    /// Finalize phase at an explicit version; local previous + 1 guard as
    /// for [`SessionLifecycle::lock_funds_at`].
    pub async fn finalize_swap_at(&self, plan_id: &str, proposed: u64) -> Result<SessionBinding> {
        let plan = self.store.get(plan_id)?;
        let binding = self.store.binding(plan_id)?;
        require_status(&binding, SessionStatus::Locked, "finalize")?;

        let allocations = final_allocations(&plan);
        check_conservation(&binding.allocations, &allocations)?;
        self.submit_phase(
            plan_id,
            &binding,
            proposed,
            allocations,
            SessionStatus::Finalized,
        )
        .await
    }

    /// Phase 4: closes the session with the final allocations. The remote
    /// node settles atomically on-chain from here.
    pub async fn close_swap_session(&self, plan_id: &str) -> Result<SessionBinding> {
        let plan = self.store.get(plan_id)?;
        let binding = self.store.binding(plan_id)?;
        require_status(&binding, SessionStatus::Finalized, "close")?;

        let allocations = final_allocations(&plan);
        match self
            .backend
            .close_session(&binding.session_id, &allocations)
            .await
        {
            Ok(()) => {
                info!(plan_id = %plan_id, session_id = %binding.session_id, "swap session closed");
                self.store.update_binding(plan_id, |b| {
                    b.status = SessionStatus::Closed;
                })
            }
            Err(err) => {
                self.store.mark_failed(plan_id, &err.to_string());
                warn!(plan_id = %plan_id, error = %err, "session close failed");
                Err(err)
            }
        }
    }

    async fn submit_phase(
        &self,
        plan_id: &str,
        binding: &SessionBinding,
        proposed: u64,
        allocations: Vec<Allocation>,
        next_status: SessionStatus,
    ) -> Result<SessionBinding> {
        ensure_next_version(binding.version, proposed)?;

        match self
            .backend
            .submit_state(
                &binding.session_id,
                StateIntent::Operate,
                proposed,
                &allocations,
            )
            .await
        {
            Ok(accepted) if accepted == proposed => {
                info!(
                    plan_id = %plan_id,
                    version = proposed,
                    status = ?next_status,
                    "state update accepted"
                );
                self.store.update_binding(plan_id, |b| {
                    b.version = proposed;
                    b.status = next_status;
                    b.allocations = allocations;
                })
            }
            Ok(accepted) => {
                let err = SwapError::VersionConflict {
                    expected: proposed,
                    actual: accepted,
                };
                self.store.mark_failed(plan_id, &err.to_string());
                Err(err)
            }
            Err(err) => {
                self.store.mark_failed(plan_id, &err.to_string());
                warn!(plan_id = %plan_id, error = %err, "state update failed");
                Err(err)
            }
        }
    }
}

fn require_status(binding: &SessionBinding, required: SessionStatus, phase: &str) -> Result<()> {
    if binding.status != required {
        return Err(SwapError::Validation(format!(
            "cannot {phase} a session in {:?} state",
            binding.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use clearswap_core::types::BuyerFill;
    use ethers::types::U256;

    #[derive(Default)]
    struct MockBackend {
        reject_create: bool,
        reject_submit: bool,
        skew_accepted_version: bool,
        submit_calls: AtomicUsize,
    }

    #[async_trait]
    impl SessionBackend for MockBackend {
        fn is_authenticated(&self) -> bool {
            true
        }

        async fn create_session(
            &self,
            _participants: &[String],
            _weights: &[u64],
            _quorum: u64,
            _allocations: &[Allocation],
        ) -> Result<CreatedSession> {
            if self.reject_create {
                return Err(SwapError::Remote {
                    code: 13,
                    message: "insufficient channel capacity".into(),
                });
            }
            Ok(CreatedSession {
                session_id: "0xmock-session".into(),
                version: 1,
            })
        }

        async fn submit_state(
            &self,
            _session_id: &str,
            _intent: StateIntent,
            version: u64,
            _allocations: &[Allocation],
        ) -> Result<u64> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_submit {
                return Err(SwapError::Remote {
                    code: 55,
                    message: "state rejected".into(),
                });
            }
            Ok(if self.skew_accepted_version {
                version + 1
            } else {
                version
            })
        }

        async fn close_session(
            &self,
            _session_id: &str,
            _allocations: &[Allocation],
        ) -> Result<()> {
            Ok(())
        }

        async fn ledger_balances(&self) -> Result<Vec<LedgerBalance>> {
            Ok(Vec::new())
        }
    }

    fn harness(backend: MockBackend) -> (SessionLifecycle, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let lifecycle = SessionLifecycle::new(backend.clone(), Arc::new(PlanStore::new()));
        (lifecycle, backend)
    }

    fn test_plan() -> ExecutionPlan {
        ExecutionPlan::new(
            "0xseller",
            "0xprovider",
            vec![
                BuyerFill {
                    buyer: "0xb1".into(),
                    asset_amount: U256::from(30u64),
                    payment_amount: U256::from(300u64),
                },
                BuyerFill {
                    buyer: "0xb2".into(),
                    asset_amount: U256::from(40u64),
                    payment_amount: U256::from(400u64),
                },
                BuyerFill {
                    buyer: "0xb3".into(),
                    asset_amount: U256::from(30u64),
                    payment_amount: U256::from(300u64),
                },
            ],
            "wood",
            "ytest.usd",
            U256::from(25u64),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_lifecycle_happy_path() {
        let (lifecycle, _) = harness(MockBackend::default());
        let plan = test_plan();
        let plan_id = plan.id.clone();

        let binding = lifecycle.create_swap_session(plan, None).await.unwrap();
        assert_eq!(binding.status, SessionStatus::Created);
        assert_eq!(binding.version, 1);
        assert_eq!(binding.participants[0], "0xseller");
        assert_eq!(binding.participants[1], "0xprovider");

        let binding = lifecycle.lock_funds(&plan_id).await.unwrap();
        assert_eq!(binding.status, SessionStatus::Locked);
        assert_eq!(binding.version, 2);

        let binding = lifecycle.finalize_swap(&plan_id).await.unwrap();
        assert_eq!(binding.status, SessionStatus::Finalized);
        assert_eq!(binding.version, 3);

        let binding = lifecycle.close_swap_session(&plan_id).await.unwrap();
        assert_eq!(binding.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_create_failure_rolls_back_plan() {
        let (lifecycle, _) = harness(MockBackend {
            reject_create: true,
            ..Default::default()
        });

        let err = lifecycle
            .create_swap_session(test_plan(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SwapError::Remote { code: 13, .. }));
        assert!(lifecycle.store().list().is_empty());
    }

    #[tokio::test]
    async fn test_phase_on_unknown_plan_is_not_found() {
        let (lifecycle, _) = harness(MockBackend::default());
        assert!(matches!(
            lifecycle.lock_funds("missing").await,
            Err(SwapError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_proposed_version_rejected_before_network() {
        let (lifecycle, backend) = harness(MockBackend::default());
        let plan = test_plan();
        let plan_id = plan.id.clone();
        lifecycle.create_swap_session(plan, None).await.unwrap();

        // Session is at version 1; anything but 2 must be refused locally.
        let err = lifecycle.lock_funds_at(&plan_id, 5).await.unwrap_err();

        assert!(matches!(
            err,
            SwapError::VersionConflict {
                expected: 2,
                actual: 5
            }
        ));
        assert_eq!(backend.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_version_skew_is_a_conflict() {
        let (lifecycle, _) = harness(MockBackend {
            skew_accepted_version: true,
            ..Default::default()
        });
        let plan = test_plan();
        let plan_id = plan.id.clone();
        lifecycle.create_swap_session(plan, None).await.unwrap();

        let err = lifecycle.lock_funds(&plan_id).await.unwrap_err();

        assert!(matches!(err, SwapError::VersionConflict { expected: 2, actual: 3 }));
        let binding = lifecycle.store().binding(&plan_id).unwrap();
        assert_eq!(binding.status, SessionStatus::Failed);
        assert!(binding.last_error.is_some());
    }

    #[tokio::test]
    async fn test_submit_failure_preserves_error_and_rethrows() {
        let (lifecycle, _) = harness(MockBackend {
            reject_submit: true,
            ..Default::default()
        });
        let plan = test_plan();
        let plan_id = plan.id.clone();
        lifecycle.create_swap_session(plan, None).await.unwrap();

        let err = lifecycle.lock_funds(&plan_id).await.unwrap_err();
        assert!(matches!(err, SwapError::Remote { code: 55, .. }));

        let binding = lifecycle.store().binding(&plan_id).unwrap();
        assert_eq!(binding.status, SessionStatus::Failed);
        assert!(binding.last_error.as_deref().unwrap().contains("state rejected"));

        // The plan itself survives for inspection; only create rolls back.
        assert_eq!(lifecycle.store().list().len(), 1);
    }

    #[tokio::test]
    async fn test_phases_cannot_run_out_of_order() {
        let (lifecycle, _) = harness(MockBackend::default());
        let plan = test_plan();
        let plan_id = plan.id.clone();
        lifecycle.create_swap_session(plan, None).await.unwrap();

        // Finalize straight after create: the session is not locked yet.
        assert!(matches!(
            lifecycle.finalize_swap(&plan_id).await,
            Err(SwapError::Validation(_))
        ));

        lifecycle.lock_funds(&plan_id).await.unwrap();

        // Locking twice is equally invalid.
        assert!(matches!(
            lifecycle.lock_funds(&plan_id).await,
            Err(SwapError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_weights_must_match_participants() {
        let (lifecycle, _) = harness(MockBackend::default());
        let err = lifecycle
            .create_swap_session(test_plan(), Some(vec![1, 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
        assert!(lifecycle.store().list().is_empty());
    }
}
