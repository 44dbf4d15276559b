//! App state: the lifecycle controller and its store.

use clearswap_engine::SessionLifecycle;

use crate::error::ApiError;

/// Shared state for all handlers.
pub struct AppState {
    /// The session lifecycle controller driving the clearnode.
    pub lifecycle: SessionLifecycle,
}

impl AppState {
    /// Creates app state over a lifecycle controller.
    pub fn new(lifecycle: SessionLifecycle) -> Self {
        Self { lifecycle }
    }

    /// Fails with 503 unless the clearnode session is authenticated.
    ///
    /// Privileged handlers call this before touching the lifecycle so an
    /// unauthenticated relay answers honestly instead of attempting the
    /// operation.
    pub fn ensure_authenticated(&self) -> Result<(), ApiError> {
        if self.lifecycle.is_authenticated() {
            Ok(())
        } else {
            Err(ApiError::unavailable("clearnode session is not authenticated"))
        }
    }
}
