//! Shared test helpers for tool-facing tests.
//!
//! Compiled unconditionally (like the registry it serves) so downstream
//! crates can use these fakes in their own test suites.

use crate::registry::ToolRegistry;
use drover_core::tools::{RawToolCall, ToolOutput, ToolResult};
use serde_json::Value;

/// Build a raw call with a generated id.
pub fn raw_call(name: &str, input: Value) -> RawToolCall {
    RawToolCall::new(name, input)
}

/// Extract the text payload of a result, panicking with context otherwise.
pub fn extract_text(result: &ToolResult) -> &str {
    match &result.output {
        ToolOutput::Text { text } => text,
        other => panic!("expected text output, got {other:?}"),
    }
}

/// Extract the error message of a result, panicking with context otherwise.
pub fn extract_error(result: &ToolResult) -> &str {
    match &result.output {
        ToolOutput::Error { message, .. } => message,
        other => panic!("expected error output, got {other:?}"),
    }
}

/// Every registered tool name, for allow-everything templates in tests.
pub fn all_tool_names(registry: &ToolRegistry) -> Vec<String> {
    registry.names().map(String::from).collect()
}
