//! Engine-level error taxonomy.
//!
//! Recoverable tool failures never surface here; those become error
//! [`ToolResult`](drover_core::tools::ToolResult)s in the transcript. This
//! enum covers faults that abort the run itself.

use thiserror::Error;

/// Failure to account for model spend. Fatal: a turn whose cost cannot be
/// recorded must not keep consuming the model.
#[derive(Debug, Clone, Error)]
#[error("cost accounting failed: {0}")]
pub struct CostError(pub String);

/// Failure to open a model stream.
#[derive(Debug, Clone, Error)]
#[error("failed to open model stream: {0}")]
pub struct StreamOpenError(pub String);

/// Faults that abort an agent run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The agent's type has no registered template.
    #[error("unknown agent template: {0}")]
    UnknownTemplate(String),

    /// A template declares neither a model nor a step program.
    #[error("template {0} has neither a model nor a step program")]
    TemplateInert(String),

    /// The model stream could not be opened.
    #[error(transparent)]
    StreamOpen(#[from] StreamOpenError),

    /// Cost accounting failed and the turn cannot continue.
    #[error(transparent)]
    Cost(#[from] CostError),

    /// A step program requested a tool outside its template's allow list.
    /// Unlike a hallucinated LLM call this is a host programming error, so
    /// it aborts the run instead of producing an error result.
    #[error("step program for agent {agent} requested disallowed tool {tool}")]
    ProgramToolNotAllowed {
        /// Agent whose program misbehaved.
        agent: String,
        /// The tool name it asked for.
        tool: String,
    },

    /// A background task failed to join.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_error_converts() {
        let error: RuntimeError = CostError("ledger down".into()).into();
        assert!(error.to_string().contains("ledger down"));
    }

    #[test]
    fn program_tool_error_names_both_parties() {
        let error = RuntimeError::ProgramToolNotAllowed {
            agent: "agent-1".into(),
            tool: "write_file".into(),
        };
        let text = error.to_string();
        assert!(text.contains("agent-1"));
        assert!(text.contains("write_file"));
    }
}
