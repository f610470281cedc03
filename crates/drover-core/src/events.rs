//! Stream chunks and agent lifecycle events.
//!
//! [`StreamChunk`] is the inbound contract with the LLM transport: the
//! engine consumes text/reasoning/error chunks and a terminal `Done` marker.
//! [`AgentEvent`] is the outbound contract with the response-streaming
//! boundary: raw text, tool-call markers, and turn lifecycle in emission
//! order.

use crate::tools::ToolResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One increment of an LLM response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Incremental response text (may contain embedded tool-call markup).
    Text {
        /// Text fragment.
        text: String,
    },
    /// Incremental reasoning text (never parsed for tool calls).
    Reasoning {
        /// Reasoning fragment.
        text: String,
    },
    /// Provider-reported stream error. Non-fatal to the turn.
    Error {
        /// Provider diagnostics.
        message: String,
    },
    /// Terminal marker carrying the final message id and credits consumed.
    Done {
        /// Provider message id.
        message_id: String,
        /// Credits consumed by this LLM call.
        credits: f64,
    },
}

/// Common fields on every agent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEvent {
    /// Agent this event belongs to.
    pub agent_id: String,
    /// RFC 3339 emission time.
    pub timestamp: String,
}

impl BaseEvent {
    /// Build a base event timestamped now.
    pub fn now(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Agent lifecycle and transcript events, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A turn began.
    TurnStart {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// 1-based turn index within this run.
        turn: u32,
    },
    /// Non-tool-call response text, forwarded as it arrives.
    TextDelta {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Text fragment.
        delta: String,
    },
    /// Reasoning text, forwarded as it arrives.
    Reasoning {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Reasoning fragment.
        delta: String,
    },
    /// A tool call entered the dispatcher.
    ToolCallStarted {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Invocation id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
    },
    /// A normalized tool result is available.
    ToolResultAvailable {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// The normalized result.
        result: ToolResult,
    },
    /// The step budget ran out before natural termination.
    StepBudgetExhausted {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
    },
    /// A structural fault ended the turn.
    AgentErrored {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Fault diagnostics.
        message: String,
    },
    /// A turn ended.
    TurnEnd {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Why the turn ended.
        reason: TurnEndReason,
    },
}

impl AgentEvent {
    /// Common fields of this event.
    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::TurnStart { base, .. }
            | Self::TextDelta { base, .. }
            | Self::Reasoning { base, .. }
            | Self::ToolCallStarted { base, .. }
            | Self::ToolResultAvailable { base, .. }
            | Self::StepBudgetExhausted { base }
            | Self::AgentErrored { base, .. }
            | Self::TurnEnd { base, .. } => base,
        }
    }

    /// Event type tag (for type discrimination in sinks and tests).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStart { .. } => "turn_start",
            Self::TextDelta { .. } => "text_delta",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolResultAvailable { .. } => "tool_result_available",
            Self::StepBudgetExhausted { .. } => "step_budget_exhausted",
            Self::AgentErrored { .. } => "agent_errored",
            Self::TurnEnd { .. } => "turn_end",
        }
    }
}

/// Why a run of turns stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEndReason {
    /// An end-turn tool call was dispatched.
    EndTurnTool,
    /// The model produced no actionable tool calls.
    Natural,
    /// The step budget ran out.
    StepBudget,
    /// The originating input was cancelled.
    Cancelled,
    /// A step program returned.
    ProgramCompleted,
    /// A step program faulted.
    ProgramError,
    /// A step program yielded a pause; the run resumes on the next prompt.
    Paused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let event = AgentEvent::TurnStart {
            base: BaseEvent::now("agent_1"),
            turn: 1,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.event_type());
        assert_eq!(value["agent_id"], "agent_1");
    }

    #[test]
    fn base_is_accessible_for_all_variants() {
        let events = vec![
            AgentEvent::TextDelta {
                base: BaseEvent::now("a"),
                delta: "x".into(),
            },
            AgentEvent::StepBudgetExhausted {
                base: BaseEvent::now("a"),
            },
            AgentEvent::TurnEnd {
                base: BaseEvent::now("a"),
                reason: TurnEndReason::Natural,
            },
        ];
        for event in events {
            assert_eq!(event.base().agent_id, "a");
        }
    }

    #[test]
    fn stream_chunk_discriminates() {
        let chunk = StreamChunk::Done {
            message_id: "msg_1".into(),
            credits: 1.25,
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["type"], "done");
        assert_eq!(value["message_id"], "msg_1");
    }

    #[test]
    fn turn_end_reason_snake_case() {
        let value = serde_json::to_value(TurnEndReason::EndTurnTool).unwrap();
        assert_eq!(value, "end_turn_tool");
    }
}
