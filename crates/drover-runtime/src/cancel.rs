//! Process-wide cancellation gate.
//!
//! Long-running turns poll this gate between pipeline stages: a user input
//! is registered when its run starts and deregistered when the user cancels
//! it, so "is my input still registered and is its session still connected"
//! is the engine's single liveness question. Child runs derive their input
//! ids by suffixing the parent's id; prefix matching therefore cancels an
//! entire agent tree with one deregistration.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::gauge;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Registry of live user inputs and connected sessions.
///
/// Fails closed: an input id nobody registered is not live.
pub struct CancellationGate {
    checking_enabled: AtomicBool,
    // user id -> registered input ids, insertion order preserved
    inputs: DashMap<String, Vec<String>>,
    // session id -> connected flag
    sessions: DashMap<String, bool>,
}

impl CancellationGate {
    /// Create a gate with checking enabled.
    pub fn new() -> Self {
        Self {
            checking_enabled: AtomicBool::new(true),
            inputs: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Register a user input as live.
    pub fn start(&self, user_id: &str, user_input_id: &str) {
        let mut ids = self.inputs.entry(user_id.to_string()).or_default();
        if !ids.iter().any(|id| id == user_input_id) {
            ids.push(user_input_id.to_string());
        }
        drop(ids);
        self.update_gauge();
        debug!(user_id, user_input_id, "input registered");
    }

    /// Deregister a user input. Removing the last id for a user removes the
    /// user's entry entirely.
    pub fn cancel(&self, user_id: &str, user_input_id: &str) {
        if let Entry::Occupied(mut entry) = self.inputs.entry(user_id.to_string()) {
            entry.get_mut().retain(|id| id != user_input_id);
            if entry.get().is_empty() {
                let _ = entry.remove();
            }
        }
        self.update_gauge();
        debug!(user_id, user_input_id, "input cancelled");
    }

    /// Whether a run should keep going.
    ///
    /// Live means: some registered id for this user equals the queried input
    /// id or is a prefix of it, and the session is marked connected. With
    /// checking disabled everything is live.
    pub fn is_live(&self, user_id: &str, user_input_id: &str, session_id: &str) -> bool {
        if !self.checking_enabled.load(Ordering::Relaxed) {
            return true;
        }
        let registered = self.inputs.get(user_id).is_some_and(|ids| {
            ids.iter()
                .any(|id| user_input_id == id || user_input_id.starts_with(id.as_str()))
        });
        registered && self.sessions.get(session_id).is_some_and(|flag| *flag)
    }

    /// Mark a session connected or disconnected.
    pub fn set_session_connected(&self, session_id: &str, connected: bool) {
        let _ = self.sessions.insert(session_id.to_string(), connected);
    }

    /// Turn liveness checking off; every query answers live. Used by batch
    /// drivers that have no interactive caller to lose.
    pub fn disable_checking(&self) {
        self.checking_enabled.store(false, Ordering::Relaxed);
    }

    /// Turn liveness checking back on.
    pub fn enable_checking(&self) {
        self.checking_enabled.store(true, Ordering::Relaxed);
    }

    /// Drop all registrations and session flags.
    pub fn reset(&self) {
        self.inputs.clear();
        self.sessions.clear();
        self.update_gauge();
    }

    /// Total registered input ids across all users.
    pub fn registered_count(&self) -> usize {
        self.inputs.iter().map(|entry| entry.value().len()).sum()
    }

    fn update_gauge(&self) {
        gauge!("drover_live_inputs").set(self.registered_count() as f64);
    }
}

impl Default for CancellationGate {
    fn default() -> Self {
        Self::new()
    }
}
