//! Task orchestration core
//!
//! This module contains:
//! - `Task` and its execution entry point
//! - Agent task variants built from prompt, outcome and turn strategies
//! - The workflow routing state machine
//! - The conversation turn engine
//! - The registry building validated tasks from definitions

pub mod conversation;
mod history;
mod inputs;
mod registry;
mod runtime;
mod task;
mod task_response;
mod variants;
mod workflow;

pub use conversation::{ConversationSettings, ConversationTurnEngine, TurnOutcome, TurnResponses};
pub use history::*;
pub use inputs::*;
pub use registry::*;
pub use runtime::*;
pub use task::*;
pub use task_response::*;
pub use variants::*;
pub use workflow::*;
