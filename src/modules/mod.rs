mod api_registry;
mod sandbox;
mod tool_executor;

pub use api_registry::*;
pub use sandbox::*;
pub use tool_executor::*;

use crate::core::ExecutionHistory;
use crate::errors::Result;
use crate::llm::TaskReference;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a callable function as shown to an agent
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

impl std::fmt::Display for ToolSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.description)
    }
}

/// What a function hands back to the agent
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    /// Set when the function ran a task
    pub task_reference: Option<TaskReference>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        ToolOutput {
            content: content.into(),
            task_reference: None,
        }
    }
}

/// A function an agent can invoke through a tool call
#[async_trait::async_trait]
pub trait ToolFunction: std::fmt::Debug + Send + Sync {
    fn schema(&self) -> &ToolSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    /// Invokes the function with decoded arguments
    ///
    /// # Arguments
    /// * `arguments` - JSON arguments object sent by the agent
    /// * `history` - Execution history of the task that owns the conversation
    ///
    /// # Returns
    /// * `Result<ToolOutput>` - Stringified result handed back to the agent
    async fn call(&self, arguments: Value, history: &ExecutionHistory) -> Result<ToolOutput>;
}

/// Renders a function result the way it is handed back to the agent
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
