//! # drover-runtime
//!
//! The agent execution engine: drives LLM-backed and programmatic agents
//! through repeated turns, schedules streamed tool calls under a tiered
//! ordering policy, and keeps resumable step programs alive across turns.
//!
//! - [`cancel::CancellationGate`]: process-wide live-input registry that
//!   lets long-running turns observe "has the caller gone away"
//! - [`dispatch::Dispatcher`]: the validate, authorize, check-liveness,
//!   execute, normalize pipeline for a single tool invocation
//! - [`stream::StreamScheduler`]: incremental tag parsing plus tiered
//!   dispatch ordering (mutations, then spawns, then terminators)
//! - [`steps::StepRuntime`]: in-process continuations for programmatic
//!   agents, keyed by agent id
//! - [`turn::TurnLoop`]: the per-agent control loop tying it all together
//! - [`traits`]: contracts required from collaborators (LLM transport,
//!   tool delegate, template registry, cost sink, file provider)
//!
//! The engine is a library, not a service: transports, persistence, and
//! tool semantics live on the other side of the [`traits`] boundary.
//!
//! ## Known limitation
//!
//! A programmatic agent's continuation is a live tokio task. It cannot be
//! serialized and does not survive a process restart; resuming such an
//! agent in a new process starts its step program from the beginning.

#![deny(unsafe_code)]

pub mod cancel;
pub mod dispatch;
pub mod emitter;
pub mod errors;
pub mod steps;
pub mod stream;
pub mod testutil;
pub mod traits;
pub mod turn;
pub mod types;
