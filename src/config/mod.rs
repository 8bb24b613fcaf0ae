mod parser;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::core::InputSchema;
use crate::modules::ApiStatus;

pub use parser::{load_settings, load_task_definitions, parse_duration, parse_task_definitions};

/// Closed set of task kinds a definition may name
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Workflow,
    BasicAgentTask,
    PromptAgentTask,
    AgentWithFunctions,
    CheckTask,
    CodeGenerationLLMTask,
    CodeExecutionLLMTask,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Persisted definition of a task
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskDefinition {
    /// Kind of task to build
    pub task_type: TaskType,
    /// Unique name of the task
    pub task_name: String,
    #[serde(default)]
    pub task_description: String,
    /// Fixed identifier reused by every run; a fresh one is generated when absent
    #[serde(default)]
    pub task_id: Option<String>,
    /// Named input parameters
    #[serde(default)]
    pub input_variables: Option<InputSchema>,
    /// Exit code table; each task type has its own default
    #[serde(default)]
    pub exit_codes: Option<BTreeMap<i32, String>>,
    /// Sub-tasks, keyed by the name used inside this task and pointing at definition names
    #[serde(default)]
    pub tasks: BTreeMap<String, String>,
    /// First sub-task a workflow runs
    #[serde(default)]
    pub start_task: Option<String>,
    /// Workflow routing: task name -> exit code -> [next task or null, is retry]
    #[serde(default)]
    pub tasks_end_code_routing: BTreeMap<String, BTreeMap<i32, (Option<String>, bool)>>,
    #[serde(default)]
    pub max_attempts: Option<usize>,
    /// Whether the task may appear more than once in one call chain
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// External APIs that must be active and healthy before the task runs
    #[serde(default)]
    pub required_apis: Vec<String>,
    /// Declarative deadline (e.g. "30s"); not enforced by the engine
    #[serde(default)]
    pub timeout: Option<String>,
    /// Agent answering the conversation
    #[serde(default)]
    pub agent: Option<String>,
    /// Identity executing tool calls on behalf of the agent
    #[serde(default)]
    pub execution_agent: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Template rendering the inputs into the initial user message
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// Marker substring -> exit code (check tasks)
    #[serde(default)]
    pub exit_code_response_map: BTreeMap<String, i32>,
    #[serde(default)]
    pub valid_languages: Option<Vec<String>>,
    #[serde(default)]
    pub max_recursion_depth: Option<usize>,
    #[serde(default)]
    pub termination_sentinel: Option<String>,
    /// Run fenced code blocks found in agent replies
    #[serde(default)]
    pub execute_code: bool,
    /// Give code output back to the agent for another turn
    #[serde(default = "default_return_output")]
    pub return_output_to_agent: bool,
}

fn default_recursive() -> bool {
    true
}

fn default_return_output() -> bool {
    true
}

/// Engine settings loaded from TOML
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Availability of external APIs, keyed by identifier
    #[serde(default)]
    pub apis: HashMap<String, ApiStatus>,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub conversation: ConversationDefaults,
}

/// Local sandbox configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SandboxSettings {
    /// Maximum run time, humantime format (e.g. "30s")
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

/// Fallbacks for conversation parameters a definition leaves unset
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConversationDefaults {
    #[serde(default)]
    pub max_recursion_depth: Option<usize>,
    #[serde(default)]
    pub termination_sentinel: Option<String>,
}
