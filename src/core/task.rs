use super::history::ExecutionHistoryEntry;
use super::variants::AgentTask;
use super::workflow::Workflow;
use super::{ExecutionHistory, InputSchema, Runtime, TaskOutputs, TaskResponse, TaskStatus, UsageMetrics};
use crate::config::TaskType;
use crate::constants::{FAILED_LABEL, SUCCESS_LABEL};
use crate::errors::{Error, Result};
use crate::event::Event;
use crate::llm::{build_validator, validate_payload, TaskReference};
use crate::modules::{ApiRegistry, ToolFunction, ToolOutput, ToolSchema};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Boxed future returned by task execution, so tasks can run other tasks
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a task does once started
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Runs sub-tasks following a routing table
    Workflow(Workflow),
    /// Talks to an agent and/or the sandbox
    Agent(AgentTask),
}

/// A named, validated unit of work.
///
/// Tasks are immutable once built. Every execution creates its own
/// response and history, so one `Task` can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct Task {
    /// Fixed identifier reused by every run; a fresh UUID is generated when unset
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub task_type: TaskType,
    pub input_schema: InputSchema,
    /// Exit code -> label. Always contains 0 and at least one failure code
    pub exit_codes: BTreeMap<i32, String>,
    /// Whether the task may appear more than once in one call chain
    pub recursive: bool,
    pub required_apis: Vec<String>,
    /// Declarative deadline, exposed to callers but not enforced
    pub timeout: Option<Duration>,
    /// Sub-tasks: workflow steps or tools, keyed by the name used inside this task
    pub tasks: BTreeMap<String, Arc<Task>>,
    pub kind: TaskKind,
}

/// What a kind produced before the response is assembled
#[derive(Debug, Clone)]
pub(crate) struct RunOutput {
    pub status: TaskStatus,
    pub result_code: i32,
    pub outputs: Option<TaskOutputs>,
    pub diagnostic: Option<String>,
    pub usage: UsageMetrics,
}

/// API that failed the availability check somewhere in a task tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiWarning {
    pub task_name: String,
    pub api: String,
    pub reason: String,
}

/// Result of checking the required APIs of a task and all of its sub-tasks
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub task_name: String,
    pub warnings: Vec<ApiWarning>,
    /// Distinct tasks visited
    pub checked_tasks: usize,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl Task {
    /// Creates a task with a generic `{0: Success, 1: Failed}` table and no inputs
    pub fn new(name: &str, task_type: TaskType, kind: TaskKind) -> Self {
        let mut exit_codes = BTreeMap::new();
        exit_codes.insert(0, SUCCESS_LABEL.to_string());
        exit_codes.insert(1, FAILED_LABEL.to_string());
        Task {
            id: None,
            name: name.to_string(),
            description: String::new(),
            task_type,
            input_schema: InputSchema::default(),
            exit_codes,
            recursive: true,
            required_apis: Vec::new(),
            timeout: None,
            tasks: BTreeMap::new(),
            kind,
        }
    }

    /// Code reported when a run fails before producing its own code
    pub fn failure_code(&self) -> i32 {
        self.exit_codes
            .keys()
            .copied()
            .find(|code| *code != 0)
            .unwrap_or(1)
    }

    pub fn label_for(&self, code: i32) -> String {
        self.exit_codes
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("Unknown exit code {}", code))
    }

    /// Executes the task.
    ///
    /// Never fails: every error ends up in a failed response carrying the
    /// task's failure code and a diagnostic.
    ///
    /// # Arguments
    /// * `runtime` - Agents, sandbox, API registry and event sink
    /// * `inputs` - Caller inputs, resolved against the input schema
    /// * `history` - Call chain of the caller; cloned, never mutated
    pub fn execute<'a>(
        &'a self,
        runtime: &'a Runtime,
        inputs: Map<String, Value>,
        history: &'a ExecutionHistory,
    ) -> BoxFuture<'a, TaskResponse> {
        Box::pin(async move {
            let task_id = self
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let started_at = Utc::now();
            info!("Starting task '{}' ({})", self.name, task_id);
            runtime.emit(Event::TaskStarted {
                task_id: task_id.clone(),
                task_name: self.name.clone(),
            });

            let mut chain = history.clone();
            let outcome = self.run(&task_id, runtime, &inputs, &mut chain).await;

            let (inputs, output) = match outcome {
                Ok((resolved, output)) => (resolved, output),
                Err(e) => {
                    error!("Task '{}' failed: {}", self.name, e);
                    let output = RunOutput {
                        status: TaskStatus::Failed,
                        result_code: self.failure_code(),
                        outputs: None,
                        diagnostic: Some(e.to_string()),
                        usage: UsageMetrics::default(),
                    };
                    (inputs, output)
                }
            };

            let response = TaskResponse {
                task_id: task_id.clone(),
                task_name: self.name.clone(),
                task_description: self.description.clone(),
                status: output.status,
                result_code: output.result_code,
                result_label: self.label_for(output.result_code),
                outputs: output.outputs,
                inputs,
                diagnostic: output.diagnostic,
                usage_metrics: output.usage,
                execution_history: chain.entries().to_vec(),
                started_at,
                finished_at: Utc::now(),
            };

            info!(
                "Task '{}' finished: {} ({} - {})",
                self.name, response.status, response.result_code, response.result_label
            );
            runtime.emit(Event::TaskFinished {
                task_id,
                task_name: self.name.clone(),
                status: response.status,
                result_code: response.result_code,
            });
            response
        })
    }

    async fn run(
        &self,
        task_id: &str,
        runtime: &Runtime,
        inputs: &Map<String, Value>,
        chain: &mut ExecutionHistory,
    ) -> Result<(Map<String, Value>, RunOutput)> {
        for api in &self.required_apis {
            runtime.apis.check_available(api)?;
        }

        if !self.recursive && chain.contains(&self.name) {
            return Err(Error::Recursion {
                task_name: self.name.clone(),
            });
        }
        chain.push(ExecutionHistoryEntry {
            task_name: self.name.clone(),
            task_id: task_id.to_string(),
            task_description: self.description.clone(),
        });

        let resolved = self.input_schema.resolve(&self.name, inputs)?;
        debug!("Task '{}' inputs: {:?}", self.name, resolved.keys().collect::<Vec<_>>());

        let output = match &self.kind {
            TaskKind::Workflow(workflow) => workflow.run(self, runtime, &resolved, chain).await?,
            TaskKind::Agent(agent) => agent.run(self, runtime, &resolved, chain).await?,
        };

        if !self.exit_codes.contains_key(&output.result_code) {
            return Err(Error::config(format!(
                "task '{}' produced exit code {} which is not in its exit code table",
                self.name, output.result_code
            )));
        }
        Ok((resolved, output))
    }

    /// Checks the required APIs of this task and, transitively, of its sub-tasks
    ///
    /// Each distinct task is visited once, so shared or cyclic references terminate.
    pub fn deep_validate_required_apis(&self, apis: &dyn ApiRegistry) -> ValidationReport {
        let mut report = ValidationReport {
            task_name: self.name.clone(),
            ..Default::default()
        };
        let mut visited = HashSet::new();
        self.collect_api_warnings(apis, &mut visited, &mut report);
        report
    }

    fn collect_api_warnings(
        &self,
        apis: &dyn ApiRegistry,
        visited: &mut HashSet<String>,
        report: &mut ValidationReport,
    ) {
        if !visited.insert(self.name.clone()) {
            return;
        }
        report.checked_tasks += 1;

        for api in &self.required_apis {
            if let Err(e) = apis.check_available(api) {
                let reason = match e {
                    Error::ExternalApiUnavailable { reason, .. } => reason,
                    other => other.to_string(),
                };
                report.warnings.push(ApiWarning {
                    task_name: self.name.clone(),
                    api: api.clone(),
                    reason,
                });
            }
        }
        for child in self.tasks.values() {
            child.collect_api_warnings(apis, visited, report);
        }
    }

    /// Schema under which the task is offered to an agent
    pub fn tool_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.to_json_schema(),
        }
    }

    /// Wraps the task into a function an agent can call
    ///
    /// # Returns
    /// * `Result<TaskTool>` - The tool, or a configuration error when the input schema does not compile
    pub fn as_tool(self: &Arc<Self>, runtime: &Runtime) -> Result<TaskTool> {
        let schema = self.tool_schema();
        let validator = build_validator(&schema.parameters)?;
        Ok(TaskTool {
            task: Arc::clone(self),
            runtime: runtime.clone(),
            schema,
            validator: Arc::new(validator),
        })
    }
}

/// A task exposed as a callable function.
///
/// Arguments are checked against the task's input schema before the task
/// runs. A failed run is reported as an error carrying its diagnostic; a
/// completed one returns its output text and a reference to its response.
#[derive(Clone)]
pub struct TaskTool {
    task: Arc<Task>,
    runtime: Runtime,
    schema: ToolSchema,
    validator: Arc<jsonschema::Validator>,
}

impl std::fmt::Debug for TaskTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTool")
            .field("task", &self.task.name)
            .field("schema", &self.schema)
            .finish()
    }
}

#[async_trait::async_trait]
impl ToolFunction for TaskTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, arguments: Value, history: &ExecutionHistory) -> Result<ToolOutput> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        if let Err(violations) = validate_payload(&self.validator, &arguments) {
            return Err(Error::ToolExecution {
                tool: self.schema.name.clone(),
                reason: format!("invalid arguments: {}", violations.join("; ")),
            });
        }
        let inputs = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let response = self.task.execute(&self.runtime, inputs, history).await;
        if response.is_complete() {
            Ok(ToolOutput {
                content: response.output_text(),
                task_reference: Some(TaskReference {
                    task_id: response.task_id.clone(),
                    task_name: response.task_name.clone(),
                    result_code: response.result_code,
                }),
            })
        } else {
            Err(Error::ToolExecution {
                tool: self.schema.name.clone(),
                reason: response
                    .diagnostic
                    .unwrap_or_else(|| response.result_label.clone()),
            })
        }
    }
}
