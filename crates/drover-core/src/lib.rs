//! # drover-core
//!
//! Foundation types for the Drover agent execution engine.
//!
//! This crate provides the shared vocabulary that the other Drover crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::AgentId`], [`ids::ToolCallId`] as newtypes
//! - **Messages**: [`messages::Message`] enum with `User`, `Assistant`,
//!   `System`, and synthetic `Tool` result variants
//! - **Agent state**: [`state::AgentState`], the per-agent record a turn
//!   loop owns and tool handlers mutate
//! - **Tool calls**: [`tools::RawToolCall`], [`tools::ToolCall`],
//!   [`tools::ToolResult`] with a discriminated output union and explicit
//!   error kinds (failures are values, not unwinds)
//! - **Events**: [`events::StreamChunk`] for LLM streaming,
//!   [`events::AgentEvent`] for agent lifecycle
//! - **Text**: UTF-8-safe truncation for clamping tool output
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `drover-tools` and `drover-runtime`.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod messages;
pub mod state;
pub mod text;
pub mod tools;
