/// Substring that, once present in the latest message, ends a conversation
pub const DEFAULT_TERMINATION_SENTINEL: &str = "TERMINATE";

/// Maximum number of agent turns a conversation may take before giving up
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 3;

/// Retry budget shared by every retry edge of a workflow run
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Languages accepted in fenced code blocks when none are configured
pub const DEFAULT_VALID_LANGUAGES: &[&str] = &["python", "shell"];

/// Execution timeout applied by the local sandbox when none is configured
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 30;

/// Suffix of the input key under which a workflow stores a child's output
pub const WORKFLOW_OUTPUT_SUFFIX: &str = "_output";

/// Input key holding `{task, output}` records of finished workflow steps, oldest first
pub const STEP_OUTPUTS_INPUT: &str = "step_outputs";

/// Name given to the tool executor when a task does not configure one
pub const DEFAULT_EXECUTION_AGENT: &str = "executor";

/// Input key carrying a message list (basic and code execution tasks)
pub const MESSAGES_INPUT: &str = "messages";

/// Input key carrying the free-form prompt of prompt-based tasks
pub const PROMPT_INPUT: &str = "prompt";

pub const SUCCESS_LABEL: &str = "Success";
pub const FAILED_LABEL: &str = "Failed";
pub const GENERATION_FAILED_LABEL: &str = "Generation failed";
pub const NO_CODE_LABEL: &str = "No code found";
pub const EXECUTION_FAILED_LABEL: &str = "Execution failed";
pub const TIMEOUT_LABEL: &str = "Timed out";
