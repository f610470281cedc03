//! Streaming tool-call scheduler.
//!
//! Consumes one model response stream, forwards prose as it arrives, and
//! dispatches embedded tool calls under the tier policy: mutations start
//! immediately (serially, in arrival order) while the stream is still
//! arriving; spawn calls queue until the stream drains; terminate calls
//! queue behind every spawn. The realized order of one turn is therefore
//! all mutations, then all spawns, then all terminators, each group in
//! arrival order.

pub mod parser;

use crate::dispatch::Dispatcher;
use crate::emitter::EventEmitter;
use crate::errors::RuntimeError;
use crate::stream::parser::{StreamItem, TagParser};
use crate::traits::{AgentTemplate, ChunkStream};
use crate::types::{RunContext, SharedAgentState};
use drover_core::events::{AgentEvent, BaseEvent, StreamChunk};
use drover_core::ids::ToolCallId;
use drover_core::messages::Message;
use drover_core::tools::{RawToolCall, ToolErrorKind, ToolResult};
use drover_tools::spec::ToolTier;
use futures::StreamExt;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

/// Everything one scheduled stream produced.
#[derive(Debug)]
pub struct ScheduleOutcome {
    /// Normalized results in realized dispatch order.
    pub results: Vec<ToolResult>,
    /// Prose outside tool-call tags, concatenated.
    pub assistant_text: String,
    /// Provider message id from the terminal chunk, if one arrived.
    pub message_id: Option<String>,
    /// Credits reported by the terminal chunk.
    pub credits: f64,
    /// Whether a turn-terminating call was dispatched successfully.
    pub ended_turn: bool,
    /// Dispatches that count as actionable when deciding whether the model
    /// still has work in flight. Informational tools are excluded; unknown
    /// tools are included so the model gets a chance to correct itself.
    pub actionable_dispatches: usize,
}

/// Drives one model stream to completion under the tier policy.
pub struct StreamScheduler {
    dispatcher: Arc<Dispatcher>,
    emitter: Arc<EventEmitter>,
}

impl StreamScheduler {
    /// Build a scheduler over a dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>, emitter: Arc<EventEmitter>) -> Self {
        Self {
            dispatcher,
            emitter,
        }
    }

    /// Consume `stream` to its end, dispatching as tiers allow.
    #[instrument(skip_all, fields(agent = %run.agent_id))]
    pub async fn run(
        &self,
        mut stream: ChunkStream,
        template: &Arc<AgentTemplate>,
        state: &SharedAgentState,
        run: &RunContext,
    ) -> Result<ScheduleOutcome, RuntimeError> {
        // Mutations funnel through a dedicated worker so they execute
        // serially, in arrival order, concurrently with stream consumption.
        let (mutation_tx, mut mutation_rx) = mpsc::unbounded_channel::<RawToolCall>();
        let worker = {
            let dispatcher = Arc::clone(&self.dispatcher);
            let template = Arc::clone(template);
            let state = state.clone();
            let run = run.clone();
            tokio::spawn(async move {
                let mut results = Vec::new();
                while let Some(call) = mutation_rx.recv().await {
                    results.push(dispatcher.dispatch(call, &template, &state, &run).await);
                }
                results
            })
        };

        let mut parser = TagParser::new();
        let mut spawn_queue: Vec<RawToolCall> = Vec::new();
        let mut terminate_queue: Vec<RawToolCall> = Vec::new();
        let mut parse_failures: Vec<ToolResult> = Vec::new();
        let mut assistant_text = String::new();
        let mut message_id = None;
        let mut credits = 0.0;

        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Text { text } => {
                    for item in parser.push(&text) {
                        self.handle_item(
                            item,
                            &mutation_tx,
                            &mut spawn_queue,
                            &mut terminate_queue,
                            &mut parse_failures,
                            &mut assistant_text,
                            state,
                            run,
                        );
                    }
                }
                StreamChunk::Reasoning { text } => {
                    self.emitter.emit(AgentEvent::Reasoning {
                        base: BaseEvent::now(run.agent_id.as_str()),
                        delta: text,
                    });
                }
                StreamChunk::Error { message } => {
                    // Provider-side hiccup; the stream may still recover.
                    warn!(%message, "model stream reported an error");
                    self.emitter.emit(AgentEvent::AgentErrored {
                        base: BaseEvent::now(run.agent_id.as_str()),
                        message,
                    });
                }
                StreamChunk::Done {
                    message_id: id,
                    credits: spent,
                } => {
                    message_id = Some(id);
                    credits = spent;
                    break;
                }
            }
        }
        for item in parser.finish() {
            self.handle_item(
                item,
                &mutation_tx,
                &mut spawn_queue,
                &mut terminate_queue,
                &mut parse_failures,
                &mut assistant_text,
                state,
                run,
            );
        }

        // Close the mutation lane and wait for in-flight dispatches before
        // the queued tiers may start.
        drop(mutation_tx);
        let mut results = worker
            .await
            .map_err(|error| RuntimeError::TaskJoin(error.to_string()))?;
        results.append(&mut parse_failures);
        for call in spawn_queue {
            results.push(self.dispatcher.dispatch(call, template, state, run).await);
        }
        for call in terminate_queue {
            results.push(self.dispatcher.dispatch(call, template, state, run).await);
        }

        let ended_turn = results.iter().any(|result| {
            !result.is_error() && self.tier(&result.tool_name) == ToolTier::Terminate
        });
        let actionable_dispatches = results
            .iter()
            .filter(|result| self.is_actionable(&result.tool_name))
            .count();

        Ok(ScheduleOutcome {
            results,
            assistant_text,
            message_id,
            credits,
            ended_turn,
            actionable_dispatches,
        })
    }

    fn handle_item(
        &self,
        item: StreamItem,
        mutation_tx: &mpsc::UnboundedSender<RawToolCall>,
        spawn_queue: &mut Vec<RawToolCall>,
        terminate_queue: &mut Vec<RawToolCall>,
        parse_failures: &mut Vec<ToolResult>,
        assistant_text: &mut String,
        state: &SharedAgentState,
        run: &RunContext,
    ) {
        match item {
            StreamItem::Text(text) => {
                assistant_text.push_str(&text);
                self.emitter.emit(AgentEvent::TextDelta {
                    base: BaseEvent::now(run.agent_id.as_str()),
                    delta: text,
                });
            }
            StreamItem::Call(call) => match self.tier(&call.tool_name) {
                ToolTier::Mutation => {
                    let _ = mutation_tx.send(call);
                }
                ToolTier::Spawn => spawn_queue.push(call),
                ToolTier::Terminate => terminate_queue.push(call),
            },
            StreamItem::Malformed { message } => {
                counter!("drover_tool_call_parse_failures_total").increment(1);
                warn!(%message, "unparseable tool call in model output");
                let result = ToolResult::error(
                    "tool_call",
                    ToolCallId::generate(),
                    ToolErrorKind::InvalidInput,
                    message,
                );
                state.lock().push_message(Message::tool(result.clone()));
                self.emitter.emit(AgentEvent::ToolResultAvailable {
                    base: BaseEvent::now(run.agent_id.as_str()),
                    result: result.clone(),
                });
                parse_failures.push(result);
            }
        }
    }

    fn tier(&self, tool_name: &str) -> ToolTier {
        self.dispatcher.tier_of(tool_name)
    }

    fn is_actionable(&self, tool_name: &str) -> bool {
        self.dispatcher
            .registry()
            .spec(tool_name)
            .is_none_or(|spec| !spec.informational)
    }
}
