//! Programmatic agent runtime.
//!
//! A step program is host code that drives an agent instead of (or alongside)
//! a model. It runs as a dedicated task and talks to the engine over a pair
//! of channels: it yields tool calls and pause requests, the engine resumes
//! it with tool results. Between turns the suspended task is parked in a
//! process-local continuation table keyed by agent id. The table entry is
//! removed while a step is in progress, so there is exactly one driver per
//! continuation, and it is deleted for good only when the program completes,
//! faults, or its run is torn down.

use crate::dispatch::Dispatcher;
use crate::errors::RuntimeError;
use crate::traits::AgentTemplate;
use crate::types::{RunContext, SharedAgentState};
use dashmap::DashMap;
use drover_core::messages::Message;
use drover_core::state::AgentState;
use drover_core::tools::{RawToolCall, ToolResult};
use metrics::gauge;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

/// Failure reported by (or to) a step program.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StepProgramError(pub String);

/// Arguments handed to a step program on its first invocation.
#[derive(Debug, Clone)]
pub struct StepArgs {
    /// The user prompt that started the run.
    pub prompt: String,
    /// Structured parameters accompanying the prompt.
    pub params: Option<Value>,
    /// Snapshot of the agent state at spawn time. Live state is reached
    /// through tool calls, not through this copy.
    pub state: AgentState,
}

/// What a program yields to the engine.
#[derive(Debug)]
enum StepYield {
    Call(RawToolCall),
    Pause,
    RunAll,
}

/// What the engine sends back.
#[derive(Debug)]
enum StepResume {
    ToolResult(ToolResult),
    Continue,
}

/// The program side of the channel pair. Owned by the program task; every
/// method suspends the program until the engine answers.
#[derive(Debug)]
pub struct StepContext {
    yields_tx: mpsc::Sender<StepYield>,
    resume_rx: mpsc::Receiver<StepResume>,
}

impl StepContext {
    /// Invoke a tool through the engine's dispatch pipeline and wait for its
    /// normalized result.
    pub async fn call_tool(
        &mut self,
        tool_name: &str,
        input: Value,
    ) -> Result<ToolResult, StepProgramError> {
        self.exchange(StepYield::Call(RawToolCall::new(tool_name, input)))
            .await
            .and_then(|resume| match resume {
                StepResume::ToolResult(result) => Ok(result),
                StepResume::Continue => {
                    Err(StepProgramError("expected a tool result, got continue".into()))
                }
            })
    }

    /// Yield until the engine steps this agent again (normally on the next
    /// external prompt, or on the next turn for model-backed agents).
    pub async fn pause(&mut self) -> Result<(), StepProgramError> {
        let _ = self.exchange(StepYield::Pause).await?;
        Ok(())
    }

    /// Ask the engine to keep stepping this program without waiting for
    /// further external prompts, until it completes or pauses again.
    pub async fn run_all(&mut self) -> Result<(), StepProgramError> {
        let _ = self.exchange(StepYield::RunAll).await?;
        Ok(())
    }

    async fn exchange(&mut self, item: StepYield) -> Result<StepResume, StepProgramError> {
        self.yields_tx
            .send(item)
            .await
            .map_err(|_| StepProgramError("engine side of the step channel closed".into()))?;
        self.resume_rx
            .recv()
            .await
            .ok_or_else(|| StepProgramError("engine side of the step channel closed".into()))
    }
}

/// Future returned by one program invocation.
pub type StepFuture = Pin<Box<dyn Future<Output = Result<(), StepProgramError>> + Send>>;

/// A step program: a factory invoked once per agent instance, producing the
/// program's whole lifetime as a single future.
pub type StepProgram = Arc<dyn Fn(StepContext, StepArgs) -> StepFuture + Send + Sync>;

/// A parked program between steps.
struct Continuation {
    yields_rx: mpsc::Receiver<StepYield>,
    resume_tx: mpsc::Sender<StepResume>,
    join: JoinHandle<Result<(), StepProgramError>>,
    paused: bool,
}

/// How one step of a program ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The program returned successfully. The continuation is gone.
    Completed,
    /// The program yielded a pause. The continuation is parked.
    Paused,
    /// The program returned an error or panicked. The continuation is gone
    /// and the fault was merged into the agent output.
    Faulted(String),
}

/// Process-local host for all step programs.
///
/// Continuations cannot be serialized; a process restart loses them and the
/// affected programs start over on their next step.
pub struct StepRuntime {
    continuations: DashMap<String, Continuation>,
    run_all: DashMap<String, ()>,
}

impl StepRuntime {
    /// Empty runtime.
    pub fn new() -> Self {
        Self {
            continuations: DashMap::new(),
            run_all: DashMap::new(),
        }
    }

    /// Whether an agent currently has a parked continuation.
    pub fn has_continuation(&self, agent_id: &str) -> bool {
        self.continuations.contains_key(agent_id)
    }

    /// Whether an agent is in run-all mode.
    pub fn run_all_active(&self, agent_id: &str) -> bool {
        self.run_all.contains_key(agent_id)
    }

    /// Tear down an agent's program, if any. Used when a run ends for a
    /// reason the program never sees (cancellation, budget exhaustion).
    pub fn clear(&self, agent_id: &str) {
        if let Some((_, continuation)) = self.continuations.remove(agent_id) {
            continuation.join.abort();
            debug!(agent_id, "continuation torn down");
        }
        let _ = self.run_all.remove(agent_id);
        self.update_gauge();
    }

    /// Advance an agent's program by one step: resume (or spawn) it, service
    /// its tool calls, and return how the step ended.
    #[instrument(skip_all, fields(agent = %run.agent_id))]
    pub async fn step(
        &self,
        template: &Arc<AgentTemplate>,
        dispatcher: &Arc<Dispatcher>,
        state: &SharedAgentState,
        run: &RunContext,
        prompt: &str,
        params: Option<Value>,
    ) -> Result<StepOutcome, RuntimeError> {
        let agent_id = run.agent_id.clone();

        // Removing the entry while stepping makes this the only driver.
        let mut continuation = match self.continuations.remove(&agent_id) {
            Some((_, parked)) => parked,
            None => self.spawn(template, state, prompt, params)?,
        };
        self.update_gauge();

        if continuation.paused {
            continuation.paused = false;
            if continuation.resume_tx.send(StepResume::Continue).await.is_err() {
                debug!(agent_id, "program ended while parked");
            }
        }

        loop {
            match continuation.yields_rx.recv().await {
                Some(StepYield::Call(call)) => {
                    if !template.allows(&call.tool_name) {
                        // Host code asking for a tool outside the template is
                        // a bug, not something the program can retry around.
                        continuation.join.abort();
                        let _ = self.run_all.remove(&agent_id);
                        self.update_gauge();
                        return Err(RuntimeError::ProgramToolNotAllowed {
                            agent: agent_id,
                            tool: call.tool_name,
                        });
                    }
                    // Record the call in the transcript the same way a model
                    // would have produced it.
                    state.lock().push_message(Message::assistant(format!(
                        "<tool_call>{}</tool_call>",
                        json!({"name": call.tool_name, "input": call.input})
                    )));
                    let result = dispatcher.dispatch(call, template, state, run).await;
                    if continuation
                        .resume_tx
                        .send(StepResume::ToolResult(result))
                        .await
                        .is_err()
                    {
                        // The program returned without reading the result;
                        // the next recv sees the closed channel.
                        debug!(agent_id, "program ended before reading a tool result");
                    }
                }
                Some(StepYield::Pause) => {
                    let _ = self.run_all.remove(&agent_id);
                    continuation.paused = true;
                    let _ = self.continuations.insert(agent_id, continuation);
                    self.update_gauge();
                    return Ok(StepOutcome::Paused);
                }
                Some(StepYield::RunAll) => {
                    let _ = self.run_all.insert(agent_id.clone(), ());
                    if continuation.resume_tx.send(StepResume::Continue).await.is_err() {
                        debug!(agent_id, "program ended right after requesting run-all");
                    }
                }
                None => {
                    let outcome = match continuation.join.await {
                        Ok(Ok(())) => StepOutcome::Completed,
                        Ok(Err(fault)) => StepOutcome::Faulted(fault.to_string()),
                        Err(join_error) if join_error.is_panic() => {
                            StepOutcome::Faulted("step program panicked".into())
                        }
                        Err(join_error) => StepOutcome::Faulted(join_error.to_string()),
                    };
                    let _ = self.run_all.remove(&agent_id);
                    self.update_gauge();
                    if let StepOutcome::Faulted(message) = &outcome {
                        error!(agent_id, %message, "step program faulted");
                        let mut guard = state.lock();
                        guard.set_output_error(message.clone());
                        guard.push_message(Message::assistant(format!(
                            "Step program failed: {message}"
                        )));
                    }
                    return Ok(outcome);
                }
            }
        }
    }

    fn spawn(
        &self,
        template: &Arc<AgentTemplate>,
        state: &SharedAgentState,
        prompt: &str,
        params: Option<Value>,
    ) -> Result<Continuation, RuntimeError> {
        let program = template
            .step_program
            .clone()
            .ok_or_else(|| RuntimeError::TemplateInert(template.id.clone()))?;
        let (yields_tx, yields_rx) = mpsc::channel(1);
        let (resume_tx, resume_rx) = mpsc::channel(1);
        let context = StepContext {
            yields_tx,
            resume_rx,
        };
        let args = StepArgs {
            prompt: prompt.to_owned(),
            params,
            state: state.snapshot(),
        };
        debug!(template = %template.id, "spawning step program");
        let join = tokio::spawn(program(context, args));
        Ok(Continuation {
            yields_rx,
            resume_tx,
            join,
            paused: false,
        })
    }

    fn update_gauge(&self) {
        gauge!("drover_parked_continuations").set(self.continuations.len() as f64);
    }
}

impl Default for StepRuntime {
    fn default() -> Self {
        Self::new()
    }
}
