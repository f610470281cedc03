//! Tool identity, tiers, and specs.
//!
//! The tier is a fixed property of the tool name, not of its arguments, and
//! it is declared here as an explicit table entry so a newly added tool can
//! never be silently misclassified by a heuristic.

use crate::schema::ToolParameterSchema;
use serde::{Deserialize, Serialize};

/// Dispatch priority class. Ordering is the realized execution order within
/// one turn's stream: all `Mutation` calls, then all `Spawn` calls, then all
/// `Terminate` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTier {
    /// Local-effect and mutating tools. Dispatched as soon as they parse.
    Mutation,
    /// Agent-spawning tools. Queued until the stream drains.
    Spawn,
    /// Turn-termination signal. Queued behind every spawn.
    Terminate,
}

/// Closed set of tools the engine knows statically, plus an escape hatch for
/// template-declared tools.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Write a file (delegate-executed).
    WriteFile,
    /// Targeted string replacement in a file (delegate-executed).
    StrReplace,
    /// Run a terminal command (delegate-executed).
    RunTerminalCommand,
    /// Read file contents (delegate-executed).
    ReadFiles,
    /// Search the codebase (delegate-executed).
    CodeSearch,
    /// Replace the agent output (local).
    SetOutput,
    /// Append a message to the transcript (local).
    AddMessage,
    /// Record a reasoning note (local).
    ThinkDeeply,
    /// Replace history with a summary (local).
    Compact,
    /// Spawn child agents and wait for acknowledgement (delegate-executed).
    SpawnAgents,
    /// Spawn child agents without waiting (delegate-executed).
    SpawnAgentsAsync,
    /// End the current turn (local).
    EndTurn,
    /// A template-declared tool unknown to the engine.
    Custom(String),
}

impl ToolKind {
    /// Resolve a tool name to its kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "write_file" => Self::WriteFile,
            "str_replace" => Self::StrReplace,
            "run_terminal_command" => Self::RunTerminalCommand,
            "read_files" => Self::ReadFiles,
            "code_search" => Self::CodeSearch,
            "set_output" => Self::SetOutput,
            "add_message" => Self::AddMessage,
            "think_deeply" => Self::ThinkDeeply,
            "compact" => Self::Compact,
            "spawn_agents" => Self::SpawnAgents,
            "spawn_agents_async" => Self::SpawnAgentsAsync,
            "end_turn" => Self::EndTurn,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The canonical tool name.
    pub fn name(&self) -> &str {
        match self {
            Self::WriteFile => "write_file",
            Self::StrReplace => "str_replace",
            Self::RunTerminalCommand => "run_terminal_command",
            Self::ReadFiles => "read_files",
            Self::CodeSearch => "code_search",
            Self::SetOutput => "set_output",
            Self::AddMessage => "add_message",
            Self::ThinkDeeply => "think_deeply",
            Self::Compact => "compact",
            Self::SpawnAgents => "spawn_agents",
            Self::SpawnAgentsAsync => "spawn_agents_async",
            Self::EndTurn => "end_turn",
            Self::Custom(name) => name,
        }
    }
}

/// Declared properties of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name as it appears in tool-call markup.
    pub name: String,
    /// Human/model-facing description.
    pub description: String,
    /// Dispatch priority class.
    pub tier: ToolTier,
    /// Informational tools do not, by themselves, force another step when
    /// deciding whether a turn produced actionable output.
    pub informational: bool,
    /// Input object schema.
    pub params: ToolParameterSchema,
}

impl ToolSpec {
    /// Build a spec.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tier: ToolTier,
        informational: bool,
        params: ToolParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tier,
            informational,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_matches_dispatch_order() {
        assert!(ToolTier::Mutation < ToolTier::Spawn);
        assert!(ToolTier::Spawn < ToolTier::Terminate);
    }

    #[test]
    fn kind_round_trips_known_names() {
        for name in [
            "write_file",
            "str_replace",
            "run_terminal_command",
            "read_files",
            "code_search",
            "set_output",
            "add_message",
            "think_deeply",
            "compact",
            "spawn_agents",
            "spawn_agents_async",
            "end_turn",
        ] {
            assert_eq!(ToolKind::from_name(name).name(), name);
        }
    }

    #[test]
    fn unknown_name_becomes_custom() {
        let kind = ToolKind::from_name("template_special");
        assert_eq!(kind, ToolKind::Custom("template_special".into()));
        assert_eq!(kind.name(), "template_special");
    }
}
