use super::{stringify_value, ToolFunction, ToolOutput, ToolSchema};
use crate::core::ExecutionHistory;
use crate::errors::{Error, Result};
use crate::llm::FunctionCall;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

type Handler = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Tool backed by a plain synchronous closure
pub struct FnTool {
    schema: ToolSchema,
    handler: Arc<Handler>,
}

impl FnTool {
    pub fn new<F>(schema: ToolSchema, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        FnTool {
            schema,
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.schema.name)
            .finish()
    }
}

#[async_trait::async_trait]
impl ToolFunction for FnTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value, _history: &ExecutionHistory) -> Result<ToolOutput> {
        (self.handler)(arguments).map(|v| ToolOutput::text(stringify_value(&v)))
    }
}

/// Identity that actually runs the functions an agent asks for
///
/// The agent deciding on a call and the executor running it are kept apart:
/// the executor owns the callables, the agent only sees their schemas.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    /// Name of the execution identity, stamped on every tool message
    pub name: String,
    /// Registered functions, in registration order
    pub functions: Vec<Arc<dyn ToolFunction>>,
}

impl ToolExecutor {
    pub fn new(name: &str) -> Self {
        ToolExecutor {
            name: name.to_string(),
            functions: Vec::new(),
        }
    }

    /// Registers a function, replacing any previous one with the same name
    pub fn register(&mut self, function: Arc<dyn ToolFunction>) {
        self.functions.retain(|f| f.name() != function.name());
        self.functions.push(function);
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Retrieves a registered function by its name
    pub fn get_function(&self, name: &str) -> Option<&dyn ToolFunction> {
        self.functions
            .iter()
            .find(|f| f.name() == name)
            .map(|f| &**f)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.functions.iter().map(|f| f.schema().clone()).collect()
    }

    /// Decodes the arguments of `call` and runs the matching function
    ///
    /// # Arguments
    /// * `call` - Function name and JSON-encoded arguments
    /// * `history` - Execution history of the calling task
    ///
    /// # Returns
    /// * `Result<ToolOutput>` - The function result, or a `ToolExecution` error
    pub async fn execute_tool_call(
        &self,
        call: &FunctionCall,
        history: &ExecutionHistory,
    ) -> Result<ToolOutput> {
        let Some(function) = self.get_function(&call.name) else {
            let available = self
                .functions
                .iter()
                .map(|f| f.name().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::ToolExecution {
                tool: call.name.clone(),
                reason: format!(
                    "function not registered. Available functions: {}",
                    if available.is_empty() { "none" } else { available.as_str() }
                ),
            });
        };

        let arguments: Value = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| Error::ToolExecution {
                tool: call.name.clone(),
                reason: format!("arguments are not valid JSON: {}", e),
            })?
        };

        debug!(
            "Executor '{}' running function '{}' with {}",
            self.name, call.name, arguments
        );
        function.call(arguments, history).await
    }
}
