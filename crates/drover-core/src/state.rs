//! Per-agent persistent state.
//!
//! [`AgentState`] is owned by the turn loop for the duration of a turn and
//! handed to tool handlers by mutable reference inside a scoped critical
//! section. It is fully serializable; the one piece of agent identity that is
//! *not* here is a programmatic agent's continuation, which lives in the
//! runtime's in-process table and cannot survive a restart.

use crate::ids::AgentId;
use crate::messages::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The persistent record of one agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Identity of this agent instance.
    pub agent_id: AgentId,
    /// Spawning parent, if this agent is a sub-agent.
    pub parent_id: Option<AgentId>,
    /// Template key this agent was instantiated from.
    pub agent_type: String,
    /// Ordered role-tagged transcript. Append-only within a turn.
    pub message_history: Vec<Message>,
    /// Remaining step budget. The turn loop halts at zero or below.
    pub steps_remaining: i64,
    /// Monotonically increasing credit consumption.
    pub credits_used: f64,
    /// Open map of named sub-goals and scratch state.
    pub agent_context: HashMap<String, Value>,
    /// Last value written by `set_output`. Replaced wholesale, never merged.
    pub output: Option<Value>,
}

impl AgentState {
    /// Create a fresh agent of the given template type with a step budget.
    pub fn new(agent_type: impl Into<String>, steps_remaining: i64) -> Self {
        Self {
            agent_id: AgentId::generate(),
            parent_id: None,
            agent_type: agent_type.into(),
            message_history: Vec::new(),
            steps_remaining,
            credits_used: 0.0,
            agent_context: HashMap::new(),
            output: None,
        }
    }

    /// Create a child agent spawned by `parent`.
    pub fn child_of(parent: &AgentId, agent_type: impl Into<String>, steps_remaining: i64) -> Self {
        let mut state = Self::new(agent_type, steps_remaining);
        state.parent_id = Some(parent.clone());
        state
    }

    /// Append a message to the transcript.
    pub fn push_message(&mut self, message: Message) {
        self.message_history.push(message);
    }

    /// Replace the entire transcript with a single summarizing message.
    ///
    /// Used by the `compact` directive; everything before the summary is
    /// gone for good.
    pub fn compact_history(&mut self, summary: Message) {
        self.message_history = vec![summary];
    }

    /// Replace the agent output wholesale.
    pub fn set_output(&mut self, value: Value) {
        self.output = Some(value);
    }

    /// Merge an error field into the output, preserving other output fields
    /// when the existing output is an object.
    pub fn set_output_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        match self.output.as_mut() {
            Some(Value::Object(map)) => {
                let _ = map.insert("error".into(), Value::String(message));
            }
            _ => {
                self.output = Some(serde_json::json!({ "error": message }));
            }
        }
    }

    /// Accrue credits. The running total only ever grows.
    pub fn add_credits(&mut self, credits: f64) {
        if credits > 0.0 {
            self.credits_used += credits;
        }
    }

    /// Consume one step from the budget.
    pub fn consume_step(&mut self) {
        self.steps_remaining -= 1;
    }

    /// Whether the step budget is exhausted.
    pub fn budget_exhausted(&self) -> bool {
        self.steps_remaining <= 0
    }
}
