use super::conversation::{
    extract_code_blocks, run_code_block, ConversationSettings, ConversationTurnEngine,
};
use super::task::{RunOutput, Task};
use super::{ExecutionHistory, Runtime, TaskOutputs, TaskStatus, UsageMetrics};
use crate::constants::{
    DEFAULT_EXECUTION_AGENT, MESSAGES_INPUT, PROMPT_INPUT, STEP_OUTPUTS_INPUT, WORKFLOW_OUTPUT_SUFFIX,
};
use crate::errors::{Error, Result};
use crate::event::Event;
use crate::llm::ChatMessage;
use crate::modules::{stringify_value, ToolExecutor};
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const CODE_SUCCESS: i32 = 0;
pub const CODE_GENERATION_FAILED: i32 = 1;
pub const CODE_EXECUTION_FAILED: i32 = 1;
pub const CODE_NO_CODE: i32 = 2;
pub const CODE_TIMEOUT: i32 = 3;

/// How the initial messages of a run are built from its inputs
#[derive(Debug, Clone, PartialEq)]
pub enum PromptStrategy {
    /// The `messages` input already is the conversation
    MessageList,
    /// Inputs are rendered through a template into one user message
    Template {
        system_prompt: Option<String>,
        template: Option<String>,
    },
    /// Messages produced earlier in the chain; code is taken from these.
    /// Without a `messages` input, earlier workflow step outputs are used,
    /// oldest first.
    PriorMessages,
}

/// How the exit code is derived from what the run produced
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStrategy {
    /// Success when the agent produced anything
    Generation,
    /// First marker found in the final reply decides; longer markers are tried first
    Markers(Vec<(String, i32)>),
    /// Success only when the reply carries a runnable code block
    CodeGeneration,
    /// Decided by the sandbox outcome
    CodeExecution,
}

/// How many turns the agent gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPolicy {
    SingleTurn,
    /// Full turn engine with the task's sub-tasks exposed as tools
    Conversation,
    /// No agent involved, only the sandbox
    SandboxOnly,
}

/// Agent-facing task behavior, assembled from the three strategies
#[derive(Debug, Clone)]
pub struct AgentTask {
    pub prompt: PromptStrategy,
    pub outcome: OutcomeStrategy,
    pub turns: TurnPolicy,
    /// Agent producing replies; the runtime default when unset
    pub agent: Option<String>,
    /// Name of the identity executing tool calls and code
    pub execution_agent: Option<String>,
    pub conversation: ConversationSettings,
}

impl PromptStrategy {
    /// Builds the messages a run starts from
    ///
    /// # Arguments
    /// * `task_name` - Used in error messages
    /// * `inputs` - Resolved task inputs
    pub fn build_messages(&self, task_name: &str, inputs: &Map<String, Value>) -> Result<Vec<ChatMessage>> {
        match self {
            PromptStrategy::MessageList => message_list(task_name, inputs)?.ok_or_else(|| {
                Error::config(format!(
                    "task '{}': missing required input '{}'",
                    task_name, MESSAGES_INPUT
                ))
            }),
            PromptStrategy::Template {
                system_prompt,
                template,
            } => {
                let mut env = Environment::new();
                env.set_undefined_behavior(UndefinedBehavior::Strict);

                let mut messages = Vec::new();
                if let Some(system) = system_prompt {
                    messages.push(ChatMessage::system(&env.render_str(system, inputs)?));
                }
                let body = match template {
                    Some(template) => env.render_str(template, inputs)?,
                    None => default_prompt(inputs),
                };
                messages.push(ChatMessage::user(&body));
                Ok(messages)
            }
            PromptStrategy::PriorMessages => {
                if let Some(messages) = message_list(task_name, inputs)? {
                    return Ok(messages);
                }
                if let Some(Value::Array(steps)) = inputs.get(STEP_OUTPUTS_INPUT) {
                    return Ok(steps
                        .iter()
                        .filter_map(|step| step.get("output"))
                        .map(|output| ChatMessage::assistant(&stringify_value(output)))
                        .collect());
                }
                Ok(inputs
                    .iter()
                    .filter(|(key, _)| key.ends_with(WORKFLOW_OUTPUT_SUFFIX))
                    .map(|(_, value)| ChatMessage::assistant(&stringify_value(value)))
                    .collect())
            }
        }
    }
}

fn message_list(task_name: &str, inputs: &Map<String, Value>) -> Result<Option<Vec<ChatMessage>>> {
    match inputs.get(MESSAGES_INPUT) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            Error::config(format!(
                "task '{}': input '{}' is not a message list: {}",
                task_name, MESSAGES_INPUT, e
            ))
        }),
    }
}

/// Prompt used when no template is configured: the `prompt` input, or every input on its own line
fn default_prompt(inputs: &Map<String, Value>) -> String {
    if let Some(Value::String(prompt)) = inputs.get(PROMPT_INPUT) {
        return prompt.clone();
    }
    inputs
        .iter()
        .map(|(key, value)| format!("{}: {}", key, stringify_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_assistant_text(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "assistant")
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

impl OutcomeStrategy {
    /// Exit codes a run can end with, not counting the task's failure code
    pub fn produced_codes(&self) -> Vec<i32> {
        match self {
            OutcomeStrategy::Generation => vec![CODE_SUCCESS, CODE_GENERATION_FAILED],
            OutcomeStrategy::Markers(markers) => markers.iter().map(|(_, code)| *code).collect(),
            OutcomeStrategy::CodeGeneration => {
                vec![CODE_SUCCESS, CODE_GENERATION_FAILED, CODE_NO_CODE]
            }
            OutcomeStrategy::CodeExecution => {
                vec![CODE_SUCCESS, CODE_EXECUTION_FAILED, CODE_NO_CODE, CODE_TIMEOUT]
            }
        }
    }

    /// Derives the exit code of a finished agent run
    ///
    /// # Arguments
    /// * `messages` - Messages produced by the run
    /// * `valid_languages` - Languages counted as code
    /// * `failure_code` - Code used when no marker matches
    pub fn derive_exit_code(&self, messages: &[ChatMessage], valid_languages: &[String], failure_code: i32) -> i32 {
        let produced = messages
            .iter()
            .any(|m| !m.content.trim().is_empty() || m.requests_functions());
        match self {
            OutcomeStrategy::Generation => {
                if produced {
                    CODE_SUCCESS
                } else {
                    CODE_GENERATION_FAILED
                }
            }
            OutcomeStrategy::Markers(markers) => {
                let reply = last_assistant_text(messages);
                markers
                    .iter()
                    .find(|(marker, _)| reply.contains(marker.as_str()))
                    .map(|(_, code)| *code)
                    .unwrap_or(failure_code)
            }
            OutcomeStrategy::CodeGeneration => {
                if !produced {
                    return CODE_GENERATION_FAILED;
                }
                let has_code = messages
                    .iter()
                    .filter(|m| m.role == "assistant")
                    .any(|m| !extract_code_blocks(&m.content, valid_languages).is_empty());
                if has_code {
                    CODE_SUCCESS
                } else {
                    CODE_NO_CODE
                }
            }
            // Sandbox runs compute their own code
            OutcomeStrategy::CodeExecution => failure_code,
        }
    }
}

/// Orders markers so that longer ones win over their substrings
pub fn sorted_markers(markers: impl IntoIterator<Item = (String, i32)>) -> Vec<(String, i32)> {
    let mut markers: Vec<(String, i32)> = markers.into_iter().collect();
    markers.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    markers
}

fn status_for(code: i32) -> TaskStatus {
    if code == CODE_SUCCESS {
        TaskStatus::Complete
    } else {
        TaskStatus::Failed
    }
}

impl AgentTask {
    fn executor_name(&self) -> &str {
        self.execution_agent
            .as_deref()
            .unwrap_or(DEFAULT_EXECUTION_AGENT)
    }

    /// Builds the execution identity, exposing the task's sub-tasks as tools in conversation mode
    fn build_executor(&self, task: &Task, runtime: &Runtime) -> Result<ToolExecutor> {
        let mut executor = ToolExecutor::new(self.executor_name());
        if self.turns == TurnPolicy::Conversation {
            for child in task.tasks.values() {
                executor.register(Arc::new(child.as_tool(runtime)?));
            }
        }
        Ok(executor)
    }

    /// Runs the agent side of a task
    ///
    /// # Arguments
    /// * `task` - Owning task (name, sub-tasks, exit codes)
    /// * `runtime` - Collaborators
    /// * `inputs` - Resolved inputs
    /// * `history` - Call chain including the owning task
    pub(crate) async fn run(
        &self,
        task: &Task,
        runtime: &Runtime,
        inputs: &Map<String, Value>,
        history: &ExecutionHistory,
    ) -> Result<RunOutput> {
        let messages = self.prompt.build_messages(&task.name, inputs)?;

        if self.turns == TurnPolicy::SandboxOnly {
            return self.run_sandbox(task, runtime, &messages).await;
        }

        let agent = runtime.agents.resolve(self.agent.as_deref())?;
        let executor = self.build_executor(task, runtime)?;
        let engine = ConversationTurnEngine::new(
            &task.name,
            agent,
            executor,
            runtime.clone(),
            self.conversation.clone(),
        );

        let (produced, usage) = match self.turns {
            TurnPolicy::Conversation => {
                let mut conversation = messages;
                let outcome = engine.take_turn(&mut conversation, history).await?;
                debug!(
                    "Task '{}': {} turn(s), terminated: {}",
                    task.name, outcome.turns, outcome.terminated
                );
                (outcome.messages, outcome.usage)
            }
            _ => {
                let turn = engine.gen_turn_responses(&messages, history).await?;
                for message in &turn.messages {
                    runtime.emit(Event::NewMessage {
                        task_name: task.name.clone(),
                        message: message.clone(),
                    });
                }
                (turn.messages, turn.usage)
            }
        };

        let code = self.outcome.derive_exit_code(
            &produced,
            &self.conversation.valid_languages,
            task.failure_code(),
        );
        Ok(RunOutput {
            status: status_for(code),
            result_code: code,
            outputs: Some(TaskOutputs::Messages(produced)),
            diagnostic: None,
            usage,
        })
    }

    /// Executes code found in prior messages, skipping user and system prompts
    async fn run_sandbox(&self, task: &Task, runtime: &Runtime, messages: &[ChatMessage]) -> Result<RunOutput> {
        let blocks: Vec<_> = messages
            .iter()
            .filter(|m| m.role != "user" && m.role != "system")
            .flat_map(|m| extract_code_blocks(&m.content, &self.conversation.valid_languages))
            .collect();

        if blocks.is_empty() {
            info!("Task '{}': no code found in prior messages", task.name);
            return Ok(RunOutput {
                status: TaskStatus::Failed,
                result_code: CODE_NO_CODE,
                outputs: Some(TaskOutputs::Messages(Vec::new())),
                diagnostic: Some("No code blocks found in prior messages".to_string()),
                usage: UsageMetrics::default(),
            });
        }

        let mut usage = UsageMetrics::default();
        let mut produced = Vec::with_capacity(blocks.len());
        let mut code = CODE_SUCCESS;
        for block in &blocks {
            let (message, outcome) =
                run_code_block(runtime.sandbox.as_ref(), self.executor_name(), block).await;
            usage.code_executions += 1;
            match outcome {
                Some(outcome) => {
                    runtime.emit(Event::CodeExecuted {
                        language: block.language.clone(),
                        exit_code: outcome.exit_code,
                    });
                    if outcome.timed_out {
                        code = CODE_TIMEOUT;
                    } else if outcome.exit_code != 0 && code != CODE_TIMEOUT {
                        code = CODE_EXECUTION_FAILED;
                    }
                }
                None => {
                    if code != CODE_TIMEOUT {
                        code = CODE_EXECUTION_FAILED;
                    }
                }
            }
            produced.push(message);
        }

        Ok(RunOutput {
            status: status_for(code),
            result_code: code,
            outputs: Some(TaskOutputs::Messages(produced)),
            diagnostic: None,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ReplayAgent, ScriptedReply};
    use crate::config::TaskType;
    use crate::core::inputs::{InputSchema, ParameterDefinition, ParameterType};
    use crate::core::task::TaskKind;
    use crate::llm::ToolCall;
    use crate::modules::{CodeOutcome, CodeSandbox, StaticApiRegistry, TIMEOUT_EXIT_CODE};
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// Sandbox answering `exit N` with code N and `sleep ...` with a timeout
    #[derive(Debug, Default)]
    struct ScriptedSandbox {
        runs: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CodeSandbox for ScriptedSandbox {
        async fn execute(&self, code: &str, _language: &str) -> Result<CodeOutcome> {
            self.runs.lock().unwrap().push(code.to_string());
            let outcome = if code.starts_with("sleep") {
                CodeOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    logs: String::new(),
                    timed_out: true,
                }
            } else if let Some(status) = code.strip_prefix("exit ") {
                CodeOutcome {
                    exit_code: status.trim().parse().unwrap_or(1),
                    logs: String::new(),
                    timed_out: false,
                }
            } else {
                CodeOutcome {
                    exit_code: 0,
                    logs: "hi".into(),
                    timed_out: false,
                }
            };
            Ok(outcome)
        }
    }

    fn code_execution_task() -> Task {
        let mut task = Task::new(
            "run",
            TaskType::CodeExecutionLLMTask,
            TaskKind::Agent(AgentTask {
                prompt: PromptStrategy::PriorMessages,
                outcome: OutcomeStrategy::CodeExecution,
                turns: TurnPolicy::SandboxOnly,
                agent: None,
                execution_agent: None,
                conversation: ConversationSettings::default(),
            }),
        );
        task.exit_codes.insert(2, "No code found".into());
        task.exit_codes.insert(3, "Timed out".into());
        task
    }

    fn agent_task(name: &str, turns: TurnPolicy) -> Task {
        let task_type = match turns {
            TurnPolicy::Conversation => TaskType::AgentWithFunctions,
            _ => TaskType::PromptAgentTask,
        };
        let mut task = Task::new(
            name,
            task_type,
            TaskKind::Agent(AgentTask {
                prompt: PromptStrategy::Template {
                    system_prompt: None,
                    template: None,
                },
                outcome: OutcomeStrategy::Generation,
                turns,
                agent: None,
                execution_agent: None,
                conversation: ConversationSettings::default(),
            }),
        );
        task.input_schema = InputSchema::single(
            "prompt",
            ParameterDefinition::new(ParameterType::String, "Prompt for the agent"),
            true,
        );
        task
    }

    fn sandbox_runtime(sandbox: Arc<ScriptedSandbox>) -> Runtime {
        Runtime::new(Arc::new(StaticApiRegistry::default()), sandbox)
    }

    fn agent_runtime(agent: Arc<ReplayAgent>) -> Runtime {
        sandbox_runtime(Arc::default()).with_default_agent(agent)
    }

    async fn run_code(sandbox: &Arc<ScriptedSandbox>, messages: Value) -> crate::core::TaskResponse {
        code_execution_task()
            .execute(
                &sandbox_runtime(sandbox.clone()),
                inputs(json!({ "messages": messages })),
                &ExecutionHistory::new(),
            )
            .await
    }

    #[tokio::test]
    async fn code_execution_maps_sandbox_outcomes() {
        let sandbox = Arc::new(ScriptedSandbox::default());

        let ok = run_code(&sandbox, json!([{"role": "assistant", "content": "```sh\necho hi\n```"}])).await;
        assert_eq!(ok.status, TaskStatus::Complete);
        assert_eq!(ok.result_code, CODE_SUCCESS);
        assert_eq!(ok.messages().len(), 1);
        assert_eq!(ok.messages()[0].role, "tool");
        assert_eq!(ok.usage_metrics.code_executions, 1);

        let failed = run_code(&sandbox, json!([{"role": "assistant", "content": "```sh\nexit 4\n```"}])).await;
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.result_code, CODE_EXECUTION_FAILED);
        assert_eq!(failed.result_label, "Failed");

        let timed_out = run_code(
            &sandbox,
            json!([
                {"role": "assistant", "content": "```sh\nsleep 100\n```"},
                {"role": "assistant", "content": "```python\nexit 4\n```"}
            ]),
        )
        .await;
        assert_eq!(timed_out.result_code, CODE_TIMEOUT);
        assert_eq!(timed_out.result_label, "Timed out");

        assert_eq!(
            *sandbox.runs.lock().unwrap(),
            vec!["echo hi", "exit 4", "sleep 100", "exit 4"]
        );
    }

    #[tokio::test]
    async fn code_execution_skips_user_and_system_messages() {
        let sandbox = Arc::new(ScriptedSandbox::default());

        let response = run_code(
            &sandbox,
            json!([
                {"role": "system", "content": "```sh\nexit 1\n```"},
                {"role": "user", "content": "```sh\necho from user\n```"}
            ]),
        )
        .await;
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.result_code, CODE_NO_CODE);
        assert!(response.diagnostic.unwrap().contains("No code blocks"));
        assert!(sandbox.runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn code_execution_runs_step_outputs_in_order() {
        let sandbox = Arc::new(ScriptedSandbox::default());
        let task = code_execution_task();

        let response = task
            .execute(
                &sandbox_runtime(sandbox.clone()),
                inputs(json!({
                    "step_outputs": [
                        {"task": "zeta", "output": "```sh\necho first\n```"},
                        {"task": "alpha", "output": "```sh\necho second\n```"}
                    ],
                    "alpha_output": "```sh\necho second\n```",
                    "zeta_output": "```sh\necho first\n```"
                })),
                &ExecutionHistory::new(),
            )
            .await;
        assert!(response.is_complete());
        assert_eq!(
            *sandbox.runs.lock().unwrap(),
            vec!["echo first", "echo second"]
        );
    }

    #[tokio::test]
    async fn agent_with_functions_calls_sub_tasks_as_tools() {
        let agent = Arc::new(ReplayAgent::new(
            "agent",
            vec![
                Some(ScriptedReply::tool_calls(vec![ToolCall::new(
                    "call_1",
                    "helper",
                    r#"{"prompt": "help me"}"#,
                )])),
                Some(ScriptedReply::text("helper says ok")),
                Some(ScriptedReply::text("done TERMINATE")),
            ],
        ));
        let mut parent = agent_task("orchestrator", TurnPolicy::Conversation);
        parent.tasks.insert(
            "helper".into(),
            Arc::new(agent_task("helper", TurnPolicy::SingleTurn)),
        );

        let response = parent
            .execute(&agent_runtime(agent.clone()), inputs(json!({"prompt": "plan"})), &ExecutionHistory::new())
            .await;

        assert!(response.is_complete());
        assert_eq!(response.result_code, 0);
        assert_eq!(agent.calls(), 3);
        let tool = response.messages().iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(tool.content, "helper says ok");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool.task_references.len(), 1);
        assert_eq!(tool.task_references[0].task_name, "helper");
        assert_eq!(response.messages().last().unwrap().content, "done TERMINATE");
    }

    #[tokio::test]
    async fn nested_call_back_into_non_recursive_tool_is_refused() {
        let call_helper = |id: &str| {
            Some(ScriptedReply::tool_calls(vec![ToolCall::new(
                id,
                "helper",
                r#"{"prompt": "again"}"#,
            )]))
        };
        let agent = Arc::new(ReplayAgent::new(
            "agent",
            vec![
                call_helper("outer"),
                call_helper("inner"),
                Some(ScriptedReply::text("I GIVE UP")),
                Some(ScriptedReply::text("done TERMINATE")),
            ],
        ));

        let mut inner = agent_task("helper", TurnPolicy::SingleTurn);
        inner.recursive = false;
        let mut helper = agent_task("helper", TurnPolicy::Conversation);
        helper.recursive = false;
        if let TaskKind::Agent(agent) = &mut helper.kind {
            agent.conversation.termination_sentinel = "GIVE UP".into();
        }
        helper.tasks.insert("helper".into(), Arc::new(inner));
        let mut parent = agent_task("orchestrator", TurnPolicy::Conversation);
        parent.tasks.insert("helper".into(), Arc::new(helper));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let runtime = agent_runtime(agent.clone()).with_events(tx);
        let response = parent
            .execute(&runtime, inputs(json!({"prompt": "plan"})), &ExecutionHistory::new())
            .await;
        drop(runtime);

        assert!(response.is_complete());
        assert_eq!(agent.calls(), 4);
        let outer_tool = response.messages().iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(outer_tool.content, "I GIVE UP");

        let mut refused = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::NewMessage { task_name, message } = event {
                if task_name == "helper" && message.role == "tool" {
                    refused.push(message);
                }
            }
        }
        assert_eq!(refused.len(), 1);
        assert!(refused[0].content.starts_with("Error:"));
        assert!(refused[0].content.contains("not recursive"));
        assert!(refused[0].task_references.is_empty());
    }

    #[test]
    fn template_renders_inputs_and_system_prompt() {
        let strategy = PromptStrategy::Template {
            system_prompt: Some("You review {{ language }} code.".into()),
            template: Some("Review:\n{{ code }}".into()),
        };
        let messages = strategy
            .build_messages("review", &inputs(json!({"language": "rust", "code": "fn main() {}"})))
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "You review rust code.");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "Review:\nfn main() {}");
    }

    #[test]
    fn template_with_unknown_variable_fails() {
        let strategy = PromptStrategy::Template {
            system_prompt: None,
            template: Some("{{ missing }}".into()),
        };
        let err = strategy.build_messages("t", &Map::new()).unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn prior_messages_fall_back_to_workflow_outputs() {
        let messages = PromptStrategy::PriorMessages
            .build_messages("exec", &inputs(json!({"write_output": "```sh\nls\n```", "other": 1})))
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "assistant");
    }

    #[test]
    fn prior_messages_follow_step_order() {
        let messages = PromptStrategy::PriorMessages
            .build_messages(
                "exec",
                &inputs(json!({
                    "step_outputs": [
                        {"task": "zeta", "output": "first"},
                        {"task": "alpha", "output": "second"}
                    ],
                    "alpha_output": "second",
                    "zeta_output": "first"
                })),
            )
            .unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn message_list_must_be_messages() {
        let err = PromptStrategy::MessageList
            .build_messages("basic", &inputs(json!({"messages": [1, 2]})))
            .unwrap_err();
        assert!(err.to_string().contains("not a message list"));
    }

    #[test]
    fn markers_prefer_longer_matches() {
        let strategy = OutcomeStrategy::Markers(sorted_markers(vec![
            ("PASSED".to_string(), 0),
            ("NOT PASSED".to_string(), 1),
        ]));
        let langs = vec!["python".to_string()];
        let reply = |text: &str| vec![ChatMessage::assistant(text)];

        assert_eq!(strategy.derive_exit_code(&reply("TEST PASSED"), &langs, 9), 0);
        assert_eq!(strategy.derive_exit_code(&reply("TEST NOT PASSED"), &langs, 9), 1);
        assert_eq!(strategy.derive_exit_code(&reply("unclear"), &langs, 9), 9);
    }

    #[test]
    fn code_generation_needs_a_block() {
        let langs = vec!["python".to_string()];
        let strategy = OutcomeStrategy::CodeGeneration;
        assert_eq!(
            strategy.derive_exit_code(&[ChatMessage::assistant("```python\nprint(1)\n```")], &langs, 1),
            CODE_SUCCESS
        );
        assert_eq!(
            strategy.derive_exit_code(&[ChatMessage::assistant("no code here")], &langs, 1),
            CODE_NO_CODE
        );
        assert_eq!(
            strategy.derive_exit_code(&[ChatMessage::assistant("")], &langs, 1),
            CODE_GENERATION_FAILED
        );
    }
}
