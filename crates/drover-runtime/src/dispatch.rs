//! Single tool-call dispatch pipeline.
//!
//! Every invocation, whether parsed from a model stream or yielded by a step
//! program, goes through the same stages: registry lookup, schema
//! validation, allow-list authorization, liveness check, execution, and
//! result normalization. Recoverable failures at any stage become error
//! [`ToolResult`]s in the transcript; they never abort the turn.

use crate::cancel::CancellationGate;
use crate::emitter::EventEmitter;
use crate::traits::{AgentTemplate, ToolDelegate};
use crate::types::{RunContext, SharedAgentState};
use drover_core::events::{AgentEvent, BaseEvent};
use drover_core::messages::Message;
use drover_core::text::clamp_output;
use drover_core::tools::{RawToolCall, ToolCall, ToolErrorKind, ToolOutput, ToolResult};
use drover_tools::registry::{HandlerOutcome, ToolRegistry};
use drover_tools::schema::validate_input;
use drover_tools::spec::{ToolKind, ToolTier};
use metrics::{counter, histogram};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Largest tool output, in bytes, allowed into the transcript.
const MAX_TOOL_OUTPUT_BYTES: usize = 30_000;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Validates, authorizes, and executes tool calls.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    gate: Arc<CancellationGate>,
    delegate: Arc<dyn ToolDelegate>,
    emitter: Arc<EventEmitter>,
}

impl Dispatcher {
    /// Build a dispatcher over a fixed registry.
    pub fn new(
        registry: Arc<ToolRegistry>,
        gate: Arc<CancellationGate>,
        delegate: Arc<dyn ToolDelegate>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            registry,
            gate,
            delegate,
            emitter,
        }
    }

    /// The registry this dispatcher schedules from.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The declared tier of a tool name. Unknown names dispatch immediately
    /// so their not-found error reaches the model as early as possible.
    pub fn tier_of(&self, tool_name: &str) -> ToolTier {
        self.registry.tier(tool_name).unwrap_or(ToolTier::Mutation)
    }

    /// Run one call through the full pipeline and return its normalized
    /// result. Non-silent results are appended to the transcript and
    /// announced on the event stream before this returns.
    #[instrument(skip_all, fields(tool = %raw.tool_name, agent = %run.agent_id))]
    pub async fn dispatch(
        &self,
        raw: RawToolCall,
        template: &AgentTemplate,
        state: &SharedAgentState,
        run: &RunContext,
    ) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = self.registry.get(&raw.tool_name) else {
            warn!(tool = %raw.tool_name, "unknown tool requested");
            let result = ToolResult::error(
                raw.tool_name.clone(),
                raw.tool_call_id,
                ToolErrorKind::NotFound,
                format!("Tool not found: {}", raw.tool_name),
            );
            return self.finish(result, false, state, run, started);
        };
        let spec = tool.spec.clone();
        let handler = tool.handler.clone();

        if let Err(problems) = validate_input(&spec.params, &raw.input) {
            let result = ToolResult::error(
                raw.tool_name.clone(),
                raw.tool_call_id,
                ToolErrorKind::InvalidInput,
                format!(
                    "Invalid input for {}: {}",
                    raw.tool_name,
                    problems.join("; ")
                ),
            );
            return self.finish(result, false, state, run, started);
        }
        let call = ToolCall::from(raw);

        if !template.allows(&call.tool_name) {
            let result = ToolResult::error(
                call.tool_name.clone(),
                call.tool_call_id,
                ToolErrorKind::NotAvailable,
                format!("Tool not currently available: {}", call.tool_name),
            );
            return self.finish(result, false, state, run, started);
        }

        // Structured-output agents get their set_output payload checked
        // against the template's declared schema on top of the generic
        // any-object params.
        if matches!(ToolKind::from_name(&call.tool_name), ToolKind::SetOutput)
            && let Some(schema) = &template.output_schema
            && let Err(problems) = validate_input(schema, &call.input)
        {
            let result = ToolResult::error(
                call.tool_name.clone(),
                call.tool_call_id,
                ToolErrorKind::InvalidInput,
                format!("Output does not match schema: {}", problems.join("; ")),
            );
            return self.finish(result, false, state, run, started);
        }

        if !self
            .gate
            .is_live(&run.user_id, &run.user_input_id, &run.session_id)
        {
            // Not a fault: the caller went away. No transcript side effects.
            debug!(tool = %call.tool_name, "skipping dispatch, input no longer live");
            return ToolResult::error(
                call.tool_name.clone(),
                call.tool_call_id,
                ToolErrorKind::Cancelled,
                "User input cancelled",
            );
        }

        self.emitter.emit(AgentEvent::ToolCallStarted {
            base: BaseEvent::now(run.agent_id.as_str()),
            tool_call_id: call.tool_call_id.to_string(),
            tool_name: call.tool_name.clone(),
        });

        let (result, silent) = match handler {
            Some(handler) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let mut guard = state.lock();
                    handler(&mut guard, &call)
                }));
                match outcome {
                    Ok(Ok(HandlerOutcome::Emit(output))) => {
                        (result_from_output(&call, output), false)
                    }
                    Ok(Ok(HandlerOutcome::Silent(output))) => {
                        (result_from_output(&call, output), true)
                    }
                    Ok(Err(message)) => (
                        ToolResult::error(
                            call.tool_name.clone(),
                            call.tool_call_id.clone(),
                            ToolErrorKind::ExecutionFailed,
                            message,
                        ),
                        false,
                    ),
                    Err(_) => {
                        error!(tool = %call.tool_name, "tool handler panicked");
                        (
                            ToolResult::error(
                                call.tool_name.clone(),
                                call.tool_call_id.clone(),
                                ToolErrorKind::ExecutionFailed,
                                format!("Tool handler panicked: {}", call.tool_name),
                            ),
                            false,
                        )
                    }
                }
            }
            None => {
                let response = self
                    .delegate
                    .execute(&run.user_input_id, &call.tool_name, &call.input)
                    .await;
                let result = match response {
                    Ok(response) if response.success => ToolResult::json(&call, response.output),
                    Ok(response) => ToolResult::error(
                        call.tool_name.clone(),
                        call.tool_call_id.clone(),
                        ToolErrorKind::ExecutionFailed,
                        render_failure(&response.output),
                    ),
                    Err(message) => {
                        error!(tool = %call.tool_name, %message, "delegate execution failed");
                        ToolResult::error(
                            call.tool_name.clone(),
                            call.tool_call_id.clone(),
                            ToolErrorKind::ExecutionFailed,
                            message,
                        )
                    }
                };
                (result, false)
            }
        };

        info!(
            tool = %result.tool_name,
            ok = !result.is_error(),
            duration_ms = started.elapsed().as_millis() as u64,
            "tool dispatched"
        );
        self.finish(clamp_result(result), silent, state, run, started)
    }

    fn finish(
        &self,
        result: ToolResult,
        silent: bool,
        state: &SharedAgentState,
        run: &RunContext,
        started: Instant,
    ) -> ToolResult {
        let outcome = if result.is_error() { "error" } else { "ok" };
        counter!(
            "drover_tool_dispatches_total",
            "tool" => result.tool_name.clone(),
            "outcome" => outcome,
        )
        .increment(1);
        histogram!("drover_tool_dispatch_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        if !silent {
            state.lock().push_message(Message::tool(result.clone()));
            self.emitter.emit(AgentEvent::ToolResultAvailable {
                base: BaseEvent::now(run.agent_id.as_str()),
                result: result.clone(),
            });
        }
        result
    }
}

fn result_from_output(call: &ToolCall, output: ToolOutput) -> ToolResult {
    ToolResult {
        tool_name: call.tool_name.clone(),
        tool_call_id: call.tool_call_id.clone(),
        output,
    }
}

fn render_failure(output: &serde_json::Value) -> String {
    match output.as_str() {
        Some(text) => text.to_owned(),
        None => output.to_string(),
    }
}

fn clamp_result(mut result: ToolResult) -> ToolResult {
    if let ToolOutput::Text { text } = &mut result.output
        && text.len() > MAX_TOOL_OUTPUT_BYTES
    {
        *text = clamp_output(text, MAX_TOOL_OUTPUT_BYTES, TRUNCATION_MARKER);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingDelegate, open_gate, run_context};
    use assert_matches::assert_matches;
    use drover_core::state::AgentState;
    use drover_tools::builtin::builtin_registry;
    use drover_tools::registry::ToolRegistry;
    use drover_tools::schema::SchemaBuilder;
    use drover_tools::spec::ToolSpec;
    use drover_tools::testutil::all_tool_names;
    use serde_json::json;

    fn harness() -> (Dispatcher, Arc<RecordingDelegate>, AgentTemplate) {
        harness_with_registry(builtin_registry())
    }

    fn harness_with_registry(
        registry: ToolRegistry,
    ) -> (Dispatcher, Arc<RecordingDelegate>, AgentTemplate) {
        let registry = Arc::new(registry);
        let delegate = Arc::new(RecordingDelegate::new());
        let template = AgentTemplate::llm("t", "model", all_tool_names(&registry));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::new(open_gate()),
            Arc::clone(&delegate) as Arc<dyn ToolDelegate>,
            Arc::new(EventEmitter::new()),
        );
        (dispatcher, delegate, template)
    }

    fn shared() -> SharedAgentState {
        SharedAgentState::new(AgentState::new("t", 10))
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found_and_lands_in_history() {
        let (dispatcher, _, template) = harness();
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("frobnicate", json!({})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::NotFound));
        assert_eq!(state.lock().message_history.len(), 1);
        assert_eq!(state.lock().message_history[0].role(), "tool");
    }

    #[tokio::test]
    async fn invalid_input_reports_all_diagnostics() {
        let (dispatcher, _, template) = harness();
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("str_replace", json!({"path": 7})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidInput));
        let message = result.output_text();
        assert!(message.contains("path"), "{message}");
        assert!(message.contains("old"), "{message}");
        assert!(message.contains("new"), "{message}");
    }

    #[tokio::test]
    async fn disallowed_tool_is_not_available() {
        let (dispatcher, delegate, _) = harness();
        let narrow = AgentTemplate::llm("t", "model", vec!["read_files".into()]);
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("write_file", json!({"path": "a", "content": "b"})),
                &narrow,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::NotAvailable));
        assert!(delegate.calls().is_empty());
    }

    #[tokio::test]
    async fn dead_input_cancels_without_side_effects() {
        let (_, delegate, template) = harness();
        let gate = CancellationGate::new();
        // Nothing registered, nothing connected.
        let dispatcher = Dispatcher::new(
            Arc::new(builtin_registry()),
            Arc::new(gate),
            Arc::clone(&delegate) as Arc<dyn ToolDelegate>,
            Arc::new(EventEmitter::new()),
        );
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("write_file", json!({"path": "a", "content": "b"})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Cancelled));
        assert!(state.lock().message_history.is_empty());
        assert!(delegate.calls().is_empty());
    }

    #[tokio::test]
    async fn local_handler_mutates_state_and_appends_result() {
        let (dispatcher, delegate, template) = harness();
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("set_output", json!({"answer": 42})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert!(!result.is_error());
        assert_eq!(state.lock().output, Some(json!({"answer": 42})));
        assert_eq!(state.lock().message_history.len(), 1);
        assert!(delegate.calls().is_empty());
    }

    #[tokio::test]
    async fn silent_handler_skips_the_transcript() {
        let (dispatcher, _, template) = harness();
        let state = shared();
        state.lock().push_message(Message::user("old context"));
        let result = dispatcher
            .dispatch(
                RawToolCall::new("compact", json!({"summary": "we did things"})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert!(!result.is_error());
        // Only the compacted summary survives; no tool result was appended.
        assert_eq!(state.lock().message_history.len(), 1);
        assert_eq!(
            state.lock().message_history[0].content(),
            Some("we did things")
        );
    }

    #[tokio::test]
    async fn delegate_success_becomes_json_result() {
        let (dispatcher, delegate, template) = harness();
        delegate.respond_with(json!({"written": "a.rs"}));
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("write_file", json!({"path": "a.rs", "content": "fn"})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert!(!result.is_error());
        assert_matches!(&result.output, ToolOutput::Json { value } if value["written"] == "a.rs");
        assert_eq!(delegate.calls(), vec!["write_file".to_string()]);
    }

    #[tokio::test]
    async fn delegate_reported_failure_is_execution_failed() {
        let (dispatcher, delegate, template) = harness();
        delegate.fail_with("disk full");
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("write_file", json!({"path": "a.rs", "content": "fn"})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ExecutionFailed));
        assert!(result.output_text().contains("disk full"));
        // The error still lands in history for the model to react to.
        assert_eq!(state.lock().message_history.len(), 1);
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let mut registry = builtin_registry();
        registry.register(
            ToolSpec::new(
                "explode",
                "Always panics",
                ToolTier::Mutation,
                false,
                SchemaBuilder::new().build(),
            ),
            Some(Arc::new(|_state, _call| panic!("boom"))),
        );
        let (dispatcher, _, template) = harness_with_registry(registry);
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("explode", json!({})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ExecutionFailed));
        assert!(result.output_text().contains("panicked"));
    }

    #[tokio::test]
    async fn oversized_text_output_is_clamped() {
        let mut registry = builtin_registry();
        registry.register(
            ToolSpec::new(
                "firehose",
                "Returns a huge payload",
                ToolTier::Mutation,
                false,
                SchemaBuilder::new().build(),
            ),
            Some(Arc::new(|_state, _call| {
                Ok(HandlerOutcome::Emit(ToolOutput::Text {
                    text: "x".repeat(100_000),
                }))
            })),
        );
        let (dispatcher, _, template) = harness_with_registry(registry);
        let state = shared();
        let result = dispatcher
            .dispatch(
                RawToolCall::new("firehose", json!({})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        let text = result.output_text();
        assert!(text.len() <= MAX_TOOL_OUTPUT_BYTES);
        assert!(text.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn set_output_honors_template_schema() {
        let (dispatcher, _, mut template) = harness();
        template.output_schema = Some(
            SchemaBuilder::new()
                .required_property("verdict", json!({"type": "string"}))
                .build(),
        );
        let state = shared();

        let rejected = dispatcher
            .dispatch(
                RawToolCall::new("set_output", json!({"wrong": 1})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert_eq!(rejected.error_kind(), Some(ToolErrorKind::InvalidInput));
        assert!(state.lock().output.is_none());

        let accepted = dispatcher
            .dispatch(
                RawToolCall::new("set_output", json!({"verdict": "ship it"})),
                &template,
                &state,
                &run_context(),
            )
            .await;
        assert!(!accepted.is_error());
        assert_eq!(state.lock().output, Some(json!({"verdict": "ship it"})));
    }

    #[tokio::test]
    async fn events_bracket_the_execution() {
        let registry = Arc::new(builtin_registry());
        let delegate = Arc::new(RecordingDelegate::new());
        let emitter = Arc::new(EventEmitter::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::new(open_gate()),
            delegate as Arc<dyn ToolDelegate>,
            Arc::clone(&emitter),
        );
        let template = AgentTemplate::llm("t", "model", all_tool_names(&registry));
        let mut events = emitter.subscribe();
        let state = shared();

        let _ = dispatcher
            .dispatch(
                RawToolCall::new("think_deeply", json!({"thought": "hmm"})),
                &template,
                &state,
                &run_context(),
            )
            .await;

        assert_eq!(events.try_recv().unwrap().event_type(), "tool_call_started");
        assert_eq!(
            events.try_recv().unwrap().event_type(),
            "tool_result_available"
        );
    }
}
