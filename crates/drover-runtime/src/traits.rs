//! Boundary contracts the engine requires from its host.
//!
//! The runtime never talks to a model provider, a sandbox, or a ledger
//! directly. Hosts hand in implementations of these traits; tests hand in
//! the fakes from [`crate::testutil`].

use crate::errors::{CostError, StreamOpenError};
use crate::steps::StepProgram;
use async_trait::async_trait;
use drover_core::events::StreamChunk;
use drover_core::messages::Message;
use drover_tools::schema::ToolParameterSchema;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything that defines an agent type: which model drives it, which tools
/// it may call, its prompts, and optionally a step program that takes over
/// control flow.
#[derive(Clone)]
pub struct AgentTemplate {
    /// Template id, matching `AgentState::agent_type`.
    pub id: String,
    /// Model identifier, `None` for purely programmatic agents.
    pub model: Option<String>,
    /// Names of tools this agent may call. Everything else is rejected.
    pub tool_names: Vec<String>,
    /// System message injected at the start of a run.
    pub system_prompt: Option<String>,
    /// Standing instructions appended after the user prompt on the first turn.
    pub instructions_prompt: Option<String>,
    /// Extra system message injected on every non-first turn.
    pub step_prompt: Option<String>,
    /// Step program driving this agent, if any.
    pub step_program: Option<StepProgram>,
    /// Schema that `set_output` payloads must satisfy, if any.
    pub output_schema: Option<ToolParameterSchema>,
}

impl AgentTemplate {
    /// Minimal LLM-backed template with the given tools.
    pub fn llm(id: impl Into<String>, model: impl Into<String>, tool_names: Vec<String>) -> Self {
        Self {
            id: id.into(),
            model: Some(model.into()),
            tool_names,
            system_prompt: None,
            instructions_prompt: None,
            step_prompt: None,
            step_program: None,
            output_schema: None,
        }
    }

    /// Minimal programmatic template with the given tools.
    pub fn programmatic(
        id: impl Into<String>,
        program: StepProgram,
        tool_names: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model: None,
            tool_names,
            system_prompt: None,
            instructions_prompt: None,
            step_prompt: None,
            step_program: Some(program),
            output_schema: None,
        }
    }

    /// Whether a tool name is on this template's allow list.
    pub fn allows(&self, tool_name: &str) -> bool {
        self.tool_names.iter().any(|name| name == tool_name)
    }
}

impl fmt::Debug for AgentTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTemplate")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("tool_names", &self.tool_names)
            .field("has_step_program", &self.step_program.is_some())
            .finish_non_exhaustive()
    }
}

/// Source of agent templates, keyed by agent type.
pub trait TemplateSource: Send + Sync {
    /// Look up the template for an agent type.
    fn template(&self, agent_type: &str) -> Option<Arc<AgentTemplate>>;
}

/// What the engine sends when opening a model stream.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Full conversation so far.
    pub messages: Vec<Message>,
    /// Model identifier from the template.
    pub model: String,
    /// Agent the stream is for, for provider-side attribution.
    pub agent_id: String,
}

/// A live model response stream.
pub type ChunkStream = BoxStream<'static, StreamChunk>;

/// Opens model response streams.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open a stream for one model invocation.
    async fn open(&self, request: StreamRequest) -> Result<ChunkStream, StreamOpenError>;
}

/// Outcome of a delegated tool execution.
#[derive(Debug, Clone)]
pub struct DelegateResponse {
    /// Whether the tool ran successfully.
    pub success: bool,
    /// Tool output payload, or failure detail when `success` is false.
    pub output: Value,
}

/// Executes tools the engine has no local handler for (file edits, terminal
/// commands, agent spawning). For spawn tools the delegate acknowledges that
/// the children were launched; it does not wait for them to finish.
#[async_trait]
pub trait ToolDelegate: Send + Sync {
    /// Execute one tool call. Transport-level failures come back as `Err`
    /// and are reported to the model as execution failures.
    async fn execute(
        &self,
        user_input_id: &str,
        tool_name: &str,
        input: &Value,
    ) -> Result<DelegateResponse, String>;
}

/// Fetches current file contents for change notices.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Fetch the given paths. Missing or unreadable files map to `None`.
    async fn fetch(&self, paths: &[String]) -> HashMap<String, Option<String>>;
}

/// Records model spend per agent.
pub trait CostSink: Send + Sync {
    /// Record credits consumed by one model invocation.
    fn record(&self, agent_id: &str, credits: f64) -> Result<(), CostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_template_allows_only_listed_tools() {
        let template = AgentTemplate::llm("reviewer", "sable-large", vec!["read_files".into()]);
        assert!(template.allows("read_files"));
        assert!(!template.allows("write_file"));
        assert!(template.step_program.is_none());
    }

    #[test]
    fn debug_omits_the_program_body() {
        let program: StepProgram = Arc::new(|_ctx, _args| Box::pin(async { Ok(()) }));
        let template = AgentTemplate::programmatic("planner", program, vec![]);
        let rendered = format!("{template:?}");
        assert!(rendered.contains("has_step_program: true"));
    }
}
