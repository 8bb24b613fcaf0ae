//! Task orchestration engine.
//!
//! Declarative task definitions are turned into validated [`core::Task`]
//! trees. A task either drives an agent (single reply, multi-turn
//! conversation with sub-tasks as tools, code generation, marker checks) or
//! runs code found in earlier messages through a sandbox. Workflows chain
//! tasks with a routing table keyed by exit codes.

pub mod agents;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod event;
pub mod llm;
pub mod modules;
pub mod utils;

pub use errors::{Error, Result};
