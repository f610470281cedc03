//! Built-in tool table and local handlers.
//!
//! This is the single reviewable place where every built-in tool's tier and
//! informational flag are declared. Delegate-executed tools carry only a
//! spec; local tools also carry a synchronous handler that mutates the
//! shared [`AgentState`].

use crate::registry::{HandlerOutcome, LocalHandler, ToolRegistry};
use crate::schema::{SchemaBuilder, ToolParameterSchema};
use crate::spec::{ToolSpec, ToolTier};
use drover_core::messages::Message;
use drover_core::state::AgentState;
use drover_core::tools::{ToolCall, ToolOutput};
use serde_json::{Value, json};
use std::sync::Arc;

/// Build the full built-in registry.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // -- Tier 1: mutation / local-effect, delegate-executed --
    registry.register(
        ToolSpec::new(
            "write_file",
            "Create or overwrite a file",
            ToolTier::Mutation,
            false,
            SchemaBuilder::new()
                .required_property("path", json!({"type": "string", "description": "File path"}))
                .required_property("content", json!({"type": "string"}))
                .build(),
        ),
        None,
    );
    registry.register(
        ToolSpec::new(
            "str_replace",
            "Replace a string in a file",
            ToolTier::Mutation,
            false,
            SchemaBuilder::new()
                .required_property("path", json!({"type": "string"}))
                .required_property("old", json!({"type": "string"}))
                .required_property("new", json!({"type": "string"}))
                .build(),
        ),
        None,
    );
    registry.register(
        ToolSpec::new(
            "run_terminal_command",
            "Run a shell command in the workspace",
            ToolTier::Mutation,
            false,
            SchemaBuilder::new()
                .required_property("command", json!({"type": "string"}))
                .property("cwd", json!({"type": "string"}))
                .build(),
        ),
        None,
    );
    registry.register(
        ToolSpec::new(
            "read_files",
            "Read file contents",
            ToolTier::Mutation,
            false,
            SchemaBuilder::new()
                .required_property("paths", json!({"type": "array", "items": {"type": "string"}}))
                .build(),
        ),
        None,
    );
    registry.register(
        ToolSpec::new(
            "code_search",
            "Search the codebase for a pattern",
            ToolTier::Mutation,
            false,
            SchemaBuilder::new()
                .required_property("pattern", json!({"type": "string"}))
                .property("flags", json!({"type": "string"}))
                .build(),
        ),
        None,
    );

    // -- Tier 1: mutation, locally handled --
    registry.register(
        ToolSpec::new(
            "set_output",
            "Replace the agent output object",
            ToolTier::Mutation,
            false,
            ToolParameterSchema::any_object(),
        ),
        Some(set_output_handler()),
    );
    registry.register(
        ToolSpec::new(
            "add_message",
            "Append a message to the conversation",
            ToolTier::Mutation,
            true,
            SchemaBuilder::new()
                .property("role", json!({"type": "string", "enum": ["user", "assistant", "system"]}))
                .required_property("content", json!({"type": "string"}))
                .build(),
        ),
        Some(add_message_handler()),
    );
    registry.register(
        ToolSpec::new(
            "think_deeply",
            "Record a reasoning note without taking action",
            ToolTier::Mutation,
            true,
            SchemaBuilder::new()
                .required_property("thought", json!({"type": "string"}))
                .build(),
        ),
        Some(think_deeply_handler()),
    );
    registry.register(
        ToolSpec::new(
            "compact",
            "Replace the conversation history with a summary",
            ToolTier::Mutation,
            true,
            SchemaBuilder::new()
                .required_property("summary", json!({"type": "string"}))
                .build(),
        ),
        Some(compact_handler()),
    );

    // -- Tier 2: agent spawning, delegate-executed --
    registry.register(
        ToolSpec::new(
            "spawn_agents",
            "Spawn child agents and report their results",
            ToolTier::Spawn,
            false,
            SchemaBuilder::new()
                .required_property("agents", json!({"type": "array"}))
                .build(),
        ),
        None,
    );
    registry.register(
        ToolSpec::new(
            "spawn_agents_async",
            "Spawn child agents without waiting for them",
            ToolTier::Spawn,
            false,
            SchemaBuilder::new()
                .required_property("agents", json!({"type": "array"}))
                .build(),
        ),
        None,
    );

    // -- Tier 3: turn termination, locally handled --
    registry.register(
        ToolSpec::new(
            "end_turn",
            "Signal that this turn is complete",
            ToolTier::Terminate,
            true,
            SchemaBuilder::new().build(),
        ),
        Some(end_turn_handler()),
    );

    registry
}

fn set_output_handler() -> LocalHandler {
    Arc::new(|state: &mut AgentState, call: &ToolCall| {
        state.set_output(call.input.clone());
        Ok(HandlerOutcome::Emit(ToolOutput::Text {
            text: "Output replaced.".into(),
        }))
    })
}

fn add_message_handler() -> LocalHandler {
    Arc::new(|state: &mut AgentState, call: &ToolCall| {
        let content = required_str(&call.input, "content")?;
        let message = match call.input.get("role").and_then(Value::as_str) {
            Some("assistant") => Message::assistant(content),
            Some("system") => Message::system(content),
            _ => Message::user(content),
        };
        state.push_message(message);
        Ok(HandlerOutcome::Emit(ToolOutput::Text {
            text: "Message appended.".into(),
        }))
    })
}

fn think_deeply_handler() -> LocalHandler {
    Arc::new(|_state: &mut AgentState, call: &ToolCall| {
        let thought = required_str(&call.input, "thought")?;
        Ok(HandlerOutcome::Emit(ToolOutput::Text {
            text: format!("Thought recorded: {thought}"),
        }))
    })
}

fn compact_handler() -> LocalHandler {
    Arc::new(|state: &mut AgentState, call: &ToolCall| {
        let summary = required_str(&call.input, "summary")?;
        state.compact_history(Message::system(summary));
        // Silent: appending a result right after replacing the history would
        // undo the compaction.
        Ok(HandlerOutcome::Silent(ToolOutput::Text {
            text: "History compacted.".into(),
        }))
    })
}

fn end_turn_handler() -> LocalHandler {
    Arc::new(|_state: &mut AgentState, _call: &ToolCall| {
        Ok(HandlerOutcome::Emit(ToolOutput::Text {
            text: "Turn ended.".into(),
        }))
    })
}

fn required_str(input: &Value, name: &str) -> Result<String, String> {
    input
        .get(name)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| format!("missing required parameter: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ToolKind;
    use drover_core::tools::RawToolCall;

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall::from(RawToolCall::new(name, input))
    }

    #[test]
    fn table_covers_every_known_kind() {
        let registry = builtin_registry();
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
            assert!(registry.contains(name), "missing builtin {name}");
            // Every builtin resolves to a non-custom kind.
            assert!(!matches!(ToolKind::from_name(name), ToolKind::Custom(_)));
        }
        assert_eq!(registry.len(), 12);
    }

    #[test]
    fn tier_table_is_as_declared() {
        let registry = builtin_registry();
        assert_eq!(registry.tier("write_file"), Some(ToolTier::Mutation));
        assert_eq!(registry.tier("set_output"), Some(ToolTier::Mutation));
        assert_eq!(registry.tier("spawn_agents"), Some(ToolTier::Spawn));
        assert_eq!(registry.tier("spawn_agents_async"), Some(ToolTier::Spawn));
        assert_eq!(registry.tier("end_turn"), Some(ToolTier::Terminate));
    }

    #[test]
    fn informational_flags() {
        let registry = builtin_registry();
        for (name, informational) in [
            ("write_file", false),
            ("spawn_agents", false),
            ("set_output", false),
            ("add_message", true),
            ("think_deeply", true),
            ("compact", true),
            ("end_turn", true),
        ] {
            assert_eq!(
                registry.spec(name).unwrap().informational,
                informational,
                "flag mismatch for {name}"
            );
        }
    }

    #[test]
    fn set_output_replaces_wholesale() {
        let registry = builtin_registry();
        let handler = registry.get("set_output").unwrap().handler.clone().unwrap();
        let mut state = AgentState::new("t", 5);
        state.set_output(json!({"old": true}));

        let outcome = handler(&mut state, &call("set_output", json!({"new": 1}))).unwrap();
        assert!(matches!(outcome, HandlerOutcome::Emit(_)));
        assert_eq!(state.output, Some(json!({"new": 1})));
    }

    #[test]
    fn add_message_appends_with_role() {
        let registry = builtin_registry();
        let handler = registry.get("add_message").unwrap().handler.clone().unwrap();
        let mut state = AgentState::new("t", 5);

        let _ = handler(
            &mut state,
            &call("add_message", json!({"role": "system", "content": "note"})),
        )
        .unwrap();
        assert_eq!(state.message_history.len(), 1);
        assert_eq!(state.message_history[0].role(), "system");
    }

    #[test]
    fn add_message_missing_content_errors() {
        let registry = builtin_registry();
        let handler = registry.get("add_message").unwrap().handler.clone().unwrap();
        let mut state = AgentState::new("t", 5);

        let error = handler(&mut state, &call("add_message", json!({}))).unwrap_err();
        assert!(error.contains("content"));
        assert!(state.message_history.is_empty());
    }

    #[test]
    fn compact_is_silent_and_replaces_history() {
        let registry = builtin_registry();
        let handler = registry.get("compact").unwrap().handler.clone().unwrap();
        let mut state = AgentState::new("t", 5);
        state.push_message(Message::user("a"));
        state.push_message(Message::assistant("b"));

        let outcome = handler(&mut state, &call("compact", json!({"summary": "did things"})))
            .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Silent(_)));
        assert_eq!(state.message_history.len(), 1);
        assert_eq!(state.message_history[0].content(), Some("did things"));
    }

    #[test]
    fn end_turn_leaves_state_untouched() {
        let registry = builtin_registry();
        let handler = registry.get("end_turn").unwrap().handler.clone().unwrap();
        let mut state = AgentState::new("t", 5);

        let outcome = handler(&mut state, &call("end_turn", json!({}))).unwrap();
        assert!(matches!(outcome, HandlerOutcome::Emit(_)));
        assert!(state.message_history.is_empty());
        assert!(state.output.is_none());
    }
}
