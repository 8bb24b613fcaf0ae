use crate::core::TaskStatus;
use crate::llm::ChatMessage;

/// Progress notifications emitted while tasks run
#[derive(Debug, Clone)]
pub enum Event {
    /// A task began executing
    TaskStarted { task_id: String, task_name: String },

    /// A task produced its response
    TaskFinished {
        task_id: String,
        task_name: String,
        status: TaskStatus,
        result_code: i32,
    },

    /// A message was appended to a conversation
    NewMessage { task_name: String, message: ChatMessage },

    /// The executor ran a function on behalf of the agent
    ToolInvoked {
        executor: String,
        tool: String,
        success: bool,
    },

    /// A code block went through the sandbox
    CodeExecuted { language: String, exit_code: i32 },
}
