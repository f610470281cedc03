//! Per-agent turn loop.
//!
//! One call to [`TurnLoop::run`] drives an agent from an external prompt to
//! a terminal state: it checks liveness and budget, builds the turn's
//! messages, advances the step program and/or schedules a model stream, and
//! reconciles state, repeating until something ends the run. All turn-level
//! policy lives here; per-call policy lives in the dispatcher.

use crate::cancel::CancellationGate;
use crate::dispatch::Dispatcher;
use crate::emitter::EventEmitter;
use crate::errors::RuntimeError;
use crate::steps::{StepOutcome, StepRuntime};
use crate::stream::StreamScheduler;
use crate::traits::{CostSink, FileProvider, StreamRequest, StreamSource, TemplateSource};
use crate::types::{RunContext, SharedAgentState};
use drover_core::events::{AgentEvent, BaseEvent, TurnEndReason};
use drover_core::messages::Message;
use drover_core::state::AgentState;
use drover_core::tools::{RawToolCall, ToolCall, ToolResult};
use metrics::counter;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const STEP_BUDGET_WARNING: &str =
    "Step budget exhausted. The turn is ending; no further tools will run.";

/// Turn loop limits.
#[derive(Debug, Clone)]
pub struct TurnLoopConfig {
    /// Hard cap on turns per external prompt, independent of the agent's
    /// step budget. Zero disables the cap.
    pub max_turns: u32,
}

impl Default for TurnLoopConfig {
    fn default() -> Self {
        Self { max_turns: 50 }
    }
}

/// One external prompt to drive an agent with.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// The user's prompt text.
    pub prompt: String,
    /// Structured parameters accompanying the prompt.
    pub params: Option<Value>,
    /// Who is running, for whom, over which connection.
    pub run: RunContext,
    /// Paths changed outside the agent since its last turn.
    pub changed_files: Vec<String>,
}

/// Where a run ended up.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Final agent state, reabsorbed from the shared handle.
    pub state: AgentState,
    /// Why the run stopped.
    pub reason: TurnEndReason,
    /// Turns actually executed.
    pub turns: u32,
}

/// Drives agents through turns until a terminal condition.
pub struct TurnLoop {
    templates: Arc<dyn TemplateSource>,
    streams: Arc<dyn StreamSource>,
    files: Arc<dyn FileProvider>,
    cost: Arc<dyn CostSink>,
    dispatcher: Arc<Dispatcher>,
    scheduler: StreamScheduler,
    steps: Arc<StepRuntime>,
    gate: Arc<CancellationGate>,
    emitter: Arc<EventEmitter>,
    config: TurnLoopConfig,
}

impl TurnLoop {
    /// Wire up a turn loop from its collaborators.
    pub fn new(
        templates: Arc<dyn TemplateSource>,
        streams: Arc<dyn StreamSource>,
        files: Arc<dyn FileProvider>,
        cost: Arc<dyn CostSink>,
        dispatcher: Arc<Dispatcher>,
        steps: Arc<StepRuntime>,
        gate: Arc<CancellationGate>,
        emitter: Arc<EventEmitter>,
        config: TurnLoopConfig,
    ) -> Self {
        let scheduler = StreamScheduler::new(Arc::clone(&dispatcher), Arc::clone(&emitter));
        Self {
            templates,
            streams,
            files,
            cost,
            dispatcher,
            scheduler,
            steps,
            gate,
            emitter,
            config,
        }
    }

    /// Run an agent until its turn-sequence ends, returning the final state.
    #[instrument(skip_all, fields(agent = %request.run.agent_id, agent_type = %state.agent_type))]
    pub async fn run(
        &self,
        state: AgentState,
        request: TurnRequest,
    ) -> Result<TurnOutcome, RuntimeError> {
        let template = self
            .templates
            .template(&state.agent_type)
            .ok_or_else(|| RuntimeError::UnknownTemplate(state.agent_type.clone()))?;
        let shared = SharedAgentState::new(state);
        let run = &request.run;
        let mut turns: u32 = 0;

        let reason = loop {
            if !self
                .gate
                .is_live(&run.user_id, &run.user_input_id, &run.session_id)
            {
                debug!("input no longer live, ending run");
                break TurnEndReason::Cancelled;
            }
            if shared.lock().budget_exhausted() {
                // Exactly one warning, and nothing dispatches after it.
                shared.lock().push_message(Message::system(STEP_BUDGET_WARNING));
                self.emitter.emit(AgentEvent::StepBudgetExhausted {
                    base: BaseEvent::now(run.agent_id.as_str()),
                });
                break TurnEndReason::StepBudget;
            }
            if self.config.max_turns > 0 && turns >= self.config.max_turns {
                warn!(turns, "turn cap reached, ending run");
                break TurnEndReason::Natural;
            }

            turns += 1;
            self.emitter.emit(AgentEvent::TurnStart {
                base: BaseEvent::now(run.agent_id.as_str()),
                turn: turns,
            });

            if turns == 1 {
                self.build_first_turn(&template, &shared, &request).await;
            } else if let Some(step_prompt) = &template.step_prompt {
                shared.lock().push_message(Message::system(step_prompt.clone()));
            }

            let mut ended: Option<TurnEndReason> = None;
            let mut program_paused = false;
            if template.step_program.is_some() {
                let step = self
                    .steps
                    .step(
                        &template,
                        &self.dispatcher,
                        &shared,
                        run,
                        &request.prompt,
                        request.params.clone(),
                    )
                    .await;
                match step {
                    Ok(StepOutcome::Completed) => ended = Some(TurnEndReason::ProgramCompleted),
                    Ok(StepOutcome::Paused) => program_paused = true,
                    Ok(StepOutcome::Faulted(message)) => {
                        self.emitter.emit(AgentEvent::AgentErrored {
                            base: BaseEvent::now(run.agent_id.as_str()),
                            message,
                        });
                        ended = Some(TurnEndReason::ProgramError);
                    }
                    Err(fault) => {
                        self.emitter.emit(AgentEvent::AgentErrored {
                            base: BaseEvent::now(run.agent_id.as_str()),
                            message: fault.to_string(),
                        });
                        return Err(fault);
                    }
                }
            }

            if ended.is_none() {
                if let Some(model) = &template.model {
                    let outcome = self.model_turn(model, &template, &shared, run).await?;
                    if outcome.ended_turn {
                        ended = Some(TurnEndReason::EndTurnTool);
                    } else if outcome.actionable_dispatches == 0 && !program_paused {
                        ended = Some(TurnEndReason::Natural);
                    }
                } else if program_paused {
                    // Purely programmatic agent parked itself; the run
                    // resumes on the next external prompt.
                    ended = Some(TurnEndReason::Paused);
                } else {
                    return Err(RuntimeError::TemplateInert(template.id.clone()));
                }
            }

            shared.lock().consume_step();
            if let Some(reason) = ended {
                break reason;
            }
        };

        if reason != TurnEndReason::Paused {
            self.steps.clear(&run.agent_id);
        }
        self.emitter.emit(AgentEvent::TurnEnd {
            base: BaseEvent::now(run.agent_id.as_str()),
            reason,
        });
        counter!("drover_turn_ends_total", "reason" => reason_label(reason)).increment(1);
        info!(?reason, turns, "run ended");

        Ok(TurnOutcome {
            state: shared.snapshot(),
            reason,
            turns,
        })
    }

    async fn build_first_turn(
        &self,
        template: &crate::traits::AgentTemplate,
        shared: &SharedAgentState,
        request: &TurnRequest,
    ) {
        if let Some(system_prompt) = &template.system_prompt {
            // A resumed agent keeps its persisted history, so the prompt
            // may already be there from an earlier run.
            let already_present = shared.lock().message_history.first().is_some_and(|first| {
                matches!(first, Message::System { content, .. } if content == system_prompt)
            });
            if !already_present {
                shared.lock().push_message(Message::system(system_prompt.clone()));
            }
        }
        if !request.changed_files.is_empty() {
            let notice = self.file_change_notice(&request.changed_files).await;
            shared.lock().push_message(notice);
        }
        let prompt = match &request.params {
            Some(params) => format!("{}\n\nParams: {params}", request.prompt),
            None => request.prompt.clone(),
        };
        shared.lock().push_message(Message::user(prompt));
        if let Some(instructions) = &template.instructions_prompt {
            shared.lock().push_message(Message::system(instructions.clone()));
        }
    }

    /// Render externally changed files as a synthetic read so the model sees
    /// their current contents before it acts.
    async fn file_change_notice(&self, paths: &[String]) -> Message {
        let fetched = self.files.fetch(paths).await;
        let mut files = Map::new();
        for (path, content) in fetched {
            let _ = files.insert(path, content.map_or(Value::Null, Value::String));
        }
        let call = ToolCall::from(RawToolCall::new(
            "read_files",
            json!({"paths": paths}),
        ));
        let result = ToolResult::json(
            &call,
            json!({"note": "files changed outside this agent", "files": files}),
        );
        Message::tool(result)
    }

    async fn model_turn(
        &self,
        model: &str,
        template: &Arc<crate::traits::AgentTemplate>,
        shared: &SharedAgentState,
        run: &RunContext,
    ) -> Result<crate::stream::ScheduleOutcome, RuntimeError> {
        let stream = self
            .streams
            .open(StreamRequest {
                messages: shared.lock().message_history.clone(),
                model: model.to_owned(),
                agent_id: run.agent_id.clone(),
            })
            .await?;
        let outcome = self.scheduler.run(stream, template, shared, run).await?;

        if !outcome.assistant_text.trim().is_empty() {
            shared
                .lock()
                .push_message(Message::assistant(outcome.assistant_text.clone()));
        }
        if outcome.credits > 0.0 {
            if let Err(fault) = self.cost.record(&run.agent_id, outcome.credits) {
                error!(%fault, credits = outcome.credits, "cost accounting failed");
                self.emitter.emit(AgentEvent::AgentErrored {
                    base: BaseEvent::now(run.agent_id.as_str()),
                    message: fault.to_string(),
                });
                return Err(fault.into());
            }
            shared.lock().add_credits(outcome.credits);
        }
        Ok(outcome)
    }
}

fn reason_label(reason: TurnEndReason) -> &'static str {
    match reason {
        TurnEndReason::EndTurnTool => "end_turn_tool",
        TurnEndReason::Natural => "natural",
        TurnEndReason::StepBudget => "step_budget",
        TurnEndReason::Cancelled => "cancelled",
        TurnEndReason::ProgramCompleted => "program_completed",
        TurnEndReason::ProgramError => "program_error",
        TurnEndReason::Paused => "paused",
    }
}
