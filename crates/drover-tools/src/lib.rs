//! # drover-tools
//!
//! Tool vocabulary for the Drover agent engine: parameter schemas and
//! stateless input validation, the explicit tool→tier table, the registry
//! that the dispatcher and stream scheduler consult, and the local handlers
//! for state-mutating built-in tools.
//!
//! Tool *semantics* for everything that touches the outside world (files,
//! terminals, sub-agent processes) live behind the runtime's delegate
//! boundary; this crate only knows their names, schemas, and tiers.
//!
//! ## Crate Position
//!
//! Depends on `drover-core`. Depended on by `drover-runtime`.

#![deny(unsafe_code)]

pub mod builtin;
pub mod registry;
pub mod schema;
pub mod spec;
pub mod testutil;
