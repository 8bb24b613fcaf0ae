use super::history::ExecutionHistoryEntry;
use crate::agents::Usage;
use crate::llm::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a task response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Complete,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Resource accounting accumulated during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Agent replies requested
    pub turns: u64,
    pub tool_calls: u64,
    pub code_executions: u64,
}

impl UsageMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn record(&mut self, usage: &Usage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
    }

    /// Adds another run's metrics to these
    pub fn absorb(&mut self, other: &UsageMetrics) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.turns += other.turns;
        self.tool_calls += other.tool_calls;
        self.code_executions += other.code_executions;
    }
}

/// What a task produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskOutputs {
    /// Messages appended during the run
    Messages(Vec<ChatMessage>),
    /// Child responses of a workflow, in execution order
    Workflow(Vec<TaskResponse>),
}

impl TaskOutputs {
    /// Text view of the outputs: the last non-empty message, or the last child's text
    pub fn text(&self) -> String {
        match self {
            TaskOutputs::Messages(messages) => messages
                .iter()
                .rev()
                .find(|m| !m.content.trim().is_empty())
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            TaskOutputs::Workflow(responses) => responses
                .last()
                .map(|r| r.output_text())
                .unwrap_or_default(),
        }
    }
}

/// Structured result of a task execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    pub status: TaskStatus,
    /// Always a key of the task's exit code table
    pub result_code: i32,
    pub result_label: String,
    pub outputs: Option<TaskOutputs>,
    pub inputs: Map<String, Value>,
    /// Human readable explanation, set on failures
    pub diagnostic: Option<String>,
    pub usage_metrics: UsageMetrics,
    pub execution_history: Vec<ExecutionHistoryEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResponse {
    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Complete
    }

    /// Stringified output, as stored for later workflow steps and returned to agents
    pub fn output_text(&self) -> String {
        self.outputs.as_ref().map(|o| o.text()).unwrap_or_default()
    }

    /// Messages produced by the run, empty for workflows
    pub fn messages(&self) -> &[ChatMessage] {
        match &self.outputs {
            Some(TaskOutputs::Messages(messages)) => messages,
            _ => &[],
        }
    }

    /// Child responses of a workflow, empty for other tasks
    pub fn children(&self) -> &[TaskResponse] {
        match &self.outputs {
            Some(TaskOutputs::Workflow(children)) => children,
            _ => &[],
        }
    }
}
