//! Tool registry consulted by the dispatcher and stream scheduler.

use crate::schema::ToolParameterSchema;
use crate::spec::{ToolSpec, ToolTier};
use drover_core::state::AgentState;
use drover_core::tools::{ToolCall, ToolOutput};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What a local handler did, and whether its result belongs in history.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Normal result; the dispatcher appends it to the transcript.
    Emit(ToolOutput),
    /// Result that must not be appended (e.g. `compact` just replaced the
    /// entire transcript).
    Silent(ToolOutput),
}

impl HandlerOutcome {
    /// The output payload regardless of transcript visibility.
    pub fn output(&self) -> &ToolOutput {
        match self {
            Self::Emit(output) | Self::Silent(output) => output,
        }
    }
}

/// A synchronous handler run against the shared agent state inside a scoped
/// critical section. Handlers report failures as `Err(message)`; the
/// dispatcher contains any unwind that slips through.
pub type LocalHandler =
    Arc<dyn Fn(&mut AgentState, &ToolCall) -> Result<HandlerOutcome, String> + Send + Sync>;

/// A spec plus its optional local handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Declared tool properties.
    pub spec: ToolSpec,
    /// Local handler; `None` means execution goes through the delegate.
    pub handler: Option<LocalHandler>,
}

/// Name-keyed table of every tool the engine can schedule.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Re-registering a name replaces the previous entry.
    pub fn register(&mut self, spec: ToolSpec, handler: Option<LocalHandler>) {
        debug!(tool = %spec.name, tier = ?spec.tier, "tool registered");
        let _ = self
            .tools
            .insert(spec.name.clone(), RegisteredTool { spec, handler });
    }

    /// Register a template-declared custom tool.
    ///
    /// Custom tools cannot spawn agents or end turns, so they are always
    /// `Mutation` tier, and they always execute through the delegate.
    pub fn register_custom(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        params: ToolParameterSchema,
    ) {
        self.register(
            ToolSpec::new(name, description, ToolTier::Mutation, false, params),
            None,
        );
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// The declared spec for a tool name.
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|tool| &tool.spec)
    }

    /// The declared tier for a tool name.
    pub fn tier(&self, name: &str) -> Option<ToolTier> {
        self.tools.get(name).map(|tool| tool.spec.tier)
    }

    /// Whether a tool name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }
}
