mod replay;

pub use replay::*;

use crate::errors::{Error, Result};
use crate::llm::ChatMessage;
use crate::modules::ToolSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Token accounting reported by an agent for a single reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A reply produced by an agent
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// The assistant message, possibly carrying tool calls
    pub message: ChatMessage,
    pub usage: Option<Usage>,
}

impl AgentReply {
    pub fn new(message: ChatMessage) -> Self {
        AgentReply {
            message,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Generative agent capability used by the turn engine.
///
/// Concrete providers live outside this crate; anything that can turn a
/// message list into a reply plugs in here.
#[async_trait]
pub trait Agent: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Produces the next reply for `messages`, or `None` when the model gave nothing back
    ///
    /// # Arguments
    /// * `messages` - Conversation so far, oldest first
    /// * `tools` - Functions the agent may call in its reply
    async fn generate_reply(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<Option<AgentReply>>;
}

/// Named agents available to tasks, plus an optional default
#[derive(Debug, Clone, Default)]
pub struct AgentRoster {
    agents: HashMap<String, Arc<dyn Agent>>,
    default_agent: Option<Arc<dyn Agent>>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent under its own name
    pub fn insert(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn set_default(&mut self, agent: Arc<dyn Agent>) {
        self.default_agent = Some(agent);
    }

    /// Resolves the agent a task asked for, falling back to the default one
    ///
    /// # Arguments
    /// * `name` - Agent requested by the task definition, if any
    ///
    /// # Returns
    /// * `Result<Arc<dyn Agent>>` - The agent, or a configuration error when none matches
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn Agent>> {
        match name {
            Some(name) => self
                .agents
                .get(name)
                .cloned()
                .or_else(|| {
                    self.default_agent
                        .as_ref()
                        .filter(|a| a.name() == name)
                        .cloned()
                })
                .ok_or_else(|| Error::config(format!("agent '{}' is not registered", name))),
            None => self
                .default_agent
                .clone()
                .ok_or_else(|| Error::config("no default agent configured")),
        }
    }
}
