//! Tool invocation and result types.
//!
//! A tool *invocation* starts life as a [`RawToolCall`] (name + unvalidated
//! JSON input). Validation against the tool's parameter schema turns it into
//! a [`ToolCall`]; failure produces a [`ToolResult`] carrying a
//! [`ToolErrorKind`] instead. Every failure mode a model can recover from is
//! a value, never an unwind.

use crate::ids::ToolCallId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An unvalidated tool invocation as it came off the wire or a step program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    /// Name of the tool being invoked.
    pub tool_name: String,
    /// Caller-assigned invocation id.
    pub tool_call_id: ToolCallId,
    /// Raw JSON input, not yet checked against the tool schema.
    pub input: Value,
}

impl RawToolCall {
    /// Build a raw call with a generated call id.
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_call_id: ToolCallId::generate(),
            input,
        }
    }
}

/// A schema-validated tool invocation, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool being invoked.
    pub tool_name: String,
    /// Invocation id, carried through to the matching result.
    pub tool_call_id: ToolCallId,
    /// Validated JSON input.
    pub input: Value,
}

impl From<RawToolCall> for ToolCall {
    fn from(raw: RawToolCall) -> Self {
        Self {
            tool_name: raw.tool_name,
            tool_call_id: raw.tool_call_id,
            input: raw.input,
        }
    }
}

/// Classification of recoverable tool failures.
///
/// These appear in the transcript as normal (if unsuccessful) results the
/// model can react to on its next step. Structural faults (cost accounting,
/// program crashes) are *not* represented here; those terminate the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No tool with the requested name is registered.
    NotFound,
    /// Input failed schema validation.
    InvalidInput,
    /// The tool exists but is not in the agent's allowed-tool list.
    NotAvailable,
    /// The originating user input is no longer live.
    Cancelled,
    /// The handler or delegate failed while executing.
    ExecutionFailed,
}

/// Discriminated output of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Plain text payload.
    Text {
        /// The text content.
        text: String,
    },
    /// Structured JSON payload.
    Json {
        /// The structured content.
        value: Value,
    },
    /// Error payload with an explicit kind.
    Error {
        /// Failure classification.
        kind: ToolErrorKind,
        /// Human-readable diagnostics.
        message: String,
    },
}

/// Normalized result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that produced this result.
    pub tool_name: String,
    /// Invocation id this result answers.
    pub tool_call_id: ToolCallId,
    /// Discriminated output payload.
    pub output: ToolOutput,
}

impl ToolResult {
    /// Build a text result for a call.
    pub fn text(call: &ToolCall, text: impl Into<String>) -> Self {
        Self {
            tool_name: call.tool_name.clone(),
            tool_call_id: call.tool_call_id.clone(),
            output: ToolOutput::Text { text: text.into() },
        }
    }

    /// Build a structured JSON result for a call.
    pub fn json(call: &ToolCall, value: Value) -> Self {
        Self {
            tool_name: call.tool_name.clone(),
            tool_call_id: call.tool_call_id.clone(),
            output: ToolOutput::Json { value },
        }
    }

    /// Build an error result for a call that may not have validated.
    pub fn error(
        tool_name: impl Into<String>,
        tool_call_id: ToolCallId,
        kind: ToolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_call_id,
            output: ToolOutput::Error {
                kind,
                message: message.into(),
            },
        }
    }

    /// Whether this result carries an error payload.
    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error { .. })
    }

    /// The error kind, if this result is an error.
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match self.output {
            ToolOutput::Error { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// A textual rendering of the output, suitable for feeding back into a
    /// step program or transcript.
    pub fn output_text(&self) -> String {
        match &self.output {
            ToolOutput::Text { text } => text.clone(),
            ToolOutput::Json { value } => value.to_string(),
            ToolOutput::Error { kind, message } => format!("error ({kind:?}): {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall::from(RawToolCall::new(name, json!({"k": 1})))
    }

    #[test]
    fn raw_to_validated_preserves_fields() {
        let raw = RawToolCall::new("write_file", json!({"path": "a.rs"}));
        let id = raw.tool_call_id.clone();
        let validated = ToolCall::from(raw);
        assert_eq!(validated.tool_name, "write_file");
        assert_eq!(validated.tool_call_id, id);
        assert_eq!(validated.input, json!({"path": "a.rs"}));
    }

    #[test]
    fn text_result_not_error() {
        let result = ToolResult::text(&call("echo"), "done");
        assert!(!result.is_error());
        assert_eq!(result.error_kind(), None);
        assert_eq!(result.output_text(), "done");
    }

    #[test]
    fn error_result_carries_kind() {
        let result = ToolResult::error(
            "missing",
            ToolCallId::generate(),
            ToolErrorKind::NotFound,
            "Tool not found: missing",
        );
        assert!(result.is_error());
        assert_eq!(result.error_kind(), Some(ToolErrorKind::NotFound));
        assert!(result.output_text().contains("Tool not found"));
    }

    #[test]
    fn json_result_round_trips() {
        let result = ToolResult::json(&call("read_files"), json!({"files": ["a"]}));
        let encoded = serde_json::to_string(&result).unwrap();
        let back: ToolResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn output_union_discriminates_on_type() {
        let encoded = serde_json::to_value(ToolOutput::Text { text: "t".into() }).unwrap();
        assert_eq!(encoded["type"], "text");
        let encoded = serde_json::to_value(ToolOutput::Error {
            kind: ToolErrorKind::InvalidInput,
            message: "bad".into(),
        })
        .unwrap();
        assert_eq!(encoded["type"], "error");
        assert_eq!(encoded["kind"], "invalid_input");
    }
}
