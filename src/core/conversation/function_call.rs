use super::ConversationTurnEngine;
use crate::core::ExecutionHistory;
use crate::event::Event;
use crate::llm::{ChatMessage, FunctionCall};
use tracing::{debug, warn};

impl ConversationTurnEngine {
    /// Runs every function the reply asks for
    ///
    /// Each call yields exactly one `tool` message. Failures (unknown
    /// function, malformed arguments, a failing callable) are reported in
    /// the message content so the agent can correct itself next turn.
    ///
    /// # Arguments
    /// * `reply` - Assistant message carrying `tool_calls` and/or a `function_call`
    /// * `history` - Execution history of the owning task
    pub async fn handle_function_call(
        &self,
        reply: &ChatMessage,
        history: &ExecutionHistory,
    ) -> Vec<ChatMessage> {
        let mut calls: Vec<(Option<&str>, &FunctionCall)> = reply
            .tool_calls
            .iter()
            .map(|c| (Some(c.id.as_str()), &c.function))
            .collect();
        if let Some(function_call) = &reply.function_call {
            calls.push((None, function_call));
        }

        let mut messages = Vec::with_capacity(calls.len());
        for (call_id, call) in calls {
            debug!(
                "Task '{}': executor '{}' handling call to '{}'",
                self.task_name, self.executor.name, call.name
            );
            let result = self.executor.execute_tool_call(call, history).await;
            self.runtime.emit(Event::ToolInvoked {
                executor: self.executor.name.clone(),
                tool: call.name.clone(),
                success: result.is_ok(),
            });

            let message = match result {
                Ok(output) => {
                    let mut message = ChatMessage::tool(&call.name, call_id, &output.content);
                    message.task_references.extend(output.task_reference);
                    message
                }
                Err(e) => {
                    warn!("Task '{}': tool call '{}' failed: {}", self.task_name, call.name, e);
                    ChatMessage::tool(&call.name, call_id, &format!("Error: {}", e))
                }
            };
            messages.push(message);
        }
        messages
    }
}
