use super::{Agent, AgentReply, Usage};
use crate::errors::Result;
use crate::llm::{ChatMessage, FunctionCall, ToolCall};
use crate::modules::ToolSchema;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// One scripted assistant reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedReply {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ScriptedReply {
    pub fn text(content: &str) -> Self {
        ScriptedReply {
            content: content.to_string(),
            ..Default::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        ScriptedReply {
            tool_calls,
            ..Default::default()
        }
    }
}

/// Agent replaying a fixed list of replies, one per request.
///
/// A `None` entry, or running past the end of the script, yields no reply.
#[derive(Debug)]
pub struct ReplayAgent {
    name: String,
    replies: Vec<Option<ScriptedReply>>,
    cursor: AtomicUsize,
}

impl ReplayAgent {
    pub fn new(name: &str, replies: Vec<Option<ScriptedReply>>) -> Self {
        ReplayAgent {
            name: name.to_string(),
            replies,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Builds an agent answering with plain text replies in order
    pub fn from_texts(name: &str, texts: &[&str]) -> Self {
        Self::new(
            name,
            texts.iter().map(|t| Some(ScriptedReply::text(t))).collect(),
        )
    }

    /// Number of replies requested so far
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ReplayAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_reply(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> Result<Option<AgentReply>> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        debug!(
            "ReplayAgent '{}': reply #{} over {} messages",
            self.name,
            index,
            messages.len()
        );
        let Some(Some(scripted)) = self.replies.get(index) else {
            return Ok(None);
        };

        let mut message =
            ChatMessage::assistant(&scripted.content).with_tool_calls(scripted.tool_calls.clone());
        if let Some(call) = &scripted.function_call {
            message = message.with_function_call(&call.name, &call.arguments);
        }
        message.name = Some(self.name.clone());

        let reply = AgentReply::new(message);
        Ok(Some(match scripted.usage {
            Some(usage) => reply.with_usage(usage),
            None => reply,
        }))
    }
}
