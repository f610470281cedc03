//! Shared runtime value types.

use drover_core::state::AgentState;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Identity of one run: which agent is executing, on whose behalf, and over
/// which connection. The cancellation gate keys off the user and input ids;
/// the session id tracks connection liveness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Agent being driven.
    pub agent_id: String,
    /// User who issued the input.
    pub user_id: String,
    /// The specific user input this run serves. Child runs derive their ids
    /// by suffixing the parent's, which is what makes prefix matching in the
    /// gate cover whole trees.
    pub user_input_id: String,
    /// Client connection the input arrived on.
    pub session_id: String,
}

impl RunContext {
    /// Build a context from owned parts.
    pub fn new(
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        user_input_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            user_input_id: user_input_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Agent state shared between the turn loop, the dispatch worker, and step
/// program hosts.
///
/// All mutation happens inside short scoped critical sections; nothing awaits
/// while holding the lock.
#[derive(Debug, Clone)]
pub struct SharedAgentState {
    inner: Arc<Mutex<AgentState>>,
}

impl SharedAgentState {
    /// Wrap a state for the duration of a run.
    pub fn new(state: AgentState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state. Callers must not hold the guard across an await.
    pub fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.inner.lock()
    }

    /// Clone the current state out, leaving the shared copy untouched.
    pub fn snapshot(&self) -> AgentState {
        self.inner.lock().clone()
    }
}
