//! Turn-taking loop between an agent, its tools and the code sandbox.
//!
//! A turn asks the agent for one reply, runs whatever the reply asks for
//! (tool calls, fenced code blocks) and appends every produced message. The
//! loop stops on the termination sentinel or when the depth budget is spent.

mod code_blocks;
mod function_call;

pub use code_blocks::*;

use crate::agents::Agent;
use crate::constants::{
    DEFAULT_MAX_RECURSION_DEPTH, DEFAULT_TERMINATION_SENTINEL, DEFAULT_VALID_LANGUAGES,
};
use crate::core::{ExecutionHistory, Runtime, UsageMetrics};
use crate::errors::{Error, Result};
use crate::event::Event;
use crate::llm::ChatMessage;
use crate::modules::ToolExecutor;
use std::sync::Arc;
use tracing::{debug, info};

/// Knobs of a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSettings {
    /// Maximum number of agent turns per `take_turn`
    pub max_recursion_depth: usize,
    /// Substring that ends the conversation when present in the latest message
    pub termination_sentinel: String,
    /// Run fenced code blocks found in replies
    pub execute_code: bool,
    /// Normalized languages accepted for execution
    pub valid_languages: Vec<String>,
    /// Continue with another turn after code ran, so the agent sees the output
    pub return_output_to_agent: bool,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        ConversationSettings {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            termination_sentinel: DEFAULT_TERMINATION_SENTINEL.to_string(),
            execute_code: false,
            valid_languages: DEFAULT_VALID_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .collect(),
            return_output_to_agent: true,
        }
    }
}

/// Messages produced by a single turn
#[derive(Debug, Clone, Default)]
pub struct TurnResponses {
    pub messages: Vec<ChatMessage>,
    pub usage: UsageMetrics,
    /// At least one code block went through the sandbox
    pub executed_code: bool,
}

/// Result of a full `take_turn` run
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Messages appended during this call, in order
    pub messages: Vec<ChatMessage>,
    /// The sentinel was seen; depth exhaustion leaves this false
    pub terminated: bool,
    pub turns: usize,
    pub usage: UsageMetrics,
}

/// Drives an agent through one or more turns
#[derive(Debug, Clone)]
pub struct ConversationTurnEngine {
    /// Task on whose behalf the conversation runs, used in events and logs
    pub task_name: String,
    agent: Arc<dyn Agent>,
    executor: ToolExecutor,
    runtime: Runtime,
    settings: ConversationSettings,
}

impl ConversationTurnEngine {
    /// Creates an engine
    ///
    /// # Arguments
    /// * `task_name` - Owner of the conversation
    /// * `agent` - Agent deciding on replies and tool calls
    /// * `executor` - Identity running tool calls; may hold no functions
    /// * `runtime` - Source of the sandbox and the event sink
    /// * `settings` - Depth, sentinel and code execution policy
    pub fn new(
        task_name: &str,
        agent: Arc<dyn Agent>,
        executor: ToolExecutor,
        runtime: Runtime,
        settings: ConversationSettings,
    ) -> Self {
        ConversationTurnEngine {
            task_name: task_name.to_string(),
            agent,
            executor,
            runtime,
            settings,
        }
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }

    /// Runs turns until the sentinel appears or the depth budget is spent
    ///
    /// # Arguments
    /// * `messages` - Conversation so far; every produced message is appended to it
    /// * `history` - Execution history of the owning task, handed to tools
    ///
    /// # Returns
    /// * `Result<TurnOutcome>` - Appended messages and termination state, or a fatal error (no agent reply)
    pub async fn take_turn(
        &self,
        messages: &mut Vec<ChatMessage>,
        history: &ExecutionHistory,
    ) -> Result<TurnOutcome> {
        let start = messages.len();
        let mut outcome = TurnOutcome::default();

        while outcome.turns < self.settings.max_recursion_depth {
            let turn = self.gen_turn_responses(messages, history).await?;
            outcome.turns += 1;
            outcome.usage.absorb(&turn.usage);

            for message in turn.messages {
                self.runtime.emit(Event::NewMessage {
                    task_name: self.task_name.clone(),
                    message: message.clone(),
                });
                messages.push(message);
            }

            if self.is_termination(messages.last()) {
                info!(
                    "Task '{}': conversation terminated after {} turn(s)",
                    self.task_name, outcome.turns
                );
                outcome.terminated = true;
                break;
            }

            if turn.executed_code && !self.settings.return_output_to_agent {
                debug!(
                    "Task '{}': code output is not returned to the agent, stopping",
                    self.task_name
                );
                break;
            }
        }

        if !outcome.terminated && outcome.turns >= self.settings.max_recursion_depth {
            info!(
                "Task '{}': reached max recursion depth {} without termination",
                self.task_name, self.settings.max_recursion_depth
            );
        }

        outcome.messages = messages[start..].to_vec();
        Ok(outcome)
    }

    /// Asks the agent for one reply and runs what it requests
    ///
    /// # Arguments
    /// * `messages` - Conversation so far
    /// * `history` - Execution history of the owning task
    ///
    /// # Returns
    /// * `Result<TurnResponses>` - The reply followed by tool and code result messages
    pub async fn gen_turn_responses(
        &self,
        messages: &[ChatMessage],
        history: &ExecutionHistory,
    ) -> Result<TurnResponses> {
        let tools = self.executor.schemas();
        let reply = self
            .agent
            .generate_reply(messages, &tools)
            .await?
            .ok_or_else(|| Error::ModelNoResponse {
                agent: self.agent.name().to_string(),
            })?;

        let mut responses = TurnResponses::default();
        responses.usage.turns = 1;
        if let Some(usage) = &reply.usage {
            responses.usage.record(usage);
        }

        let mut reply_message = reply.message;
        if reply_message.role != "assistant" {
            reply_message.role = "assistant".to_string();
        }
        if reply_message.name.is_none() {
            reply_message.name = Some(self.agent.name().to_string());
        }
        debug!(
            "Task '{}': agent '{}' replied ({} chars, {} tool calls)",
            self.task_name,
            self.agent.name(),
            reply_message.content.len(),
            reply_message.tool_calls.len()
        );

        let text = reply_message.content.clone();
        let requests_functions = reply_message.requests_functions();
        responses.messages.push(reply_message.clone());

        if requests_functions {
            let tool_messages = self.handle_function_call(&reply_message, history).await;
            responses.usage.tool_calls += tool_messages.len() as u64;
            responses.messages.extend(tool_messages);
        }

        if self.settings.execute_code {
            let blocks = extract_code_blocks(&text, &self.settings.valid_languages);
            if !blocks.is_empty() {
                let code_messages = self.execute_code_blocks(&blocks).await;
                responses.usage.code_executions += blocks.len() as u64;
                responses.executed_code = true;
                responses.messages.extend(code_messages);
            }
        }

        Ok(responses)
    }

    fn is_termination(&self, message: Option<&ChatMessage>) -> bool {
        !self.settings.termination_sentinel.is_empty()
            && message
                .map(|m| m.content.contains(&self.settings.termination_sentinel))
                .unwrap_or(false)
    }
}
