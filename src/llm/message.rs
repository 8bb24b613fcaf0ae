use serde::{Deserialize, Serialize};

/// A function invocation requested by the agent
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Name of the function to invoke
    pub name: String,
    /// Arguments, JSON-encoded as the agent produced them
    #[serde(default)]
    pub arguments: String,
}

/// A tool call carried by an assistant message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Identifier echoed back by the matching tool message
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        ToolCall {
            id: id.to_string(),
            kind: default_tool_type(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// Reference to the response of a task run inside a conversation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskReference {
    pub task_id: String,
    pub task_name: String,
    pub result_code: i32,
}

/// Represents a chat message with a role and content
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Role of the message sender (e.g. "system", "user", "assistant", "tool")
    pub role: String,
    /// Content/text of the message
    #[serde(default)]
    pub content: String,
    /// Name of the sender or, for tool messages, of the invoked function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Legacy single function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_references: Vec<TaskReference>,
}

impl ChatMessage {
    /// Creates a new chat message
    ///
    /// # Arguments
    /// * `role` - Role of the message sender
    /// * `content` - Content/text of the message
    ///
    /// # Returns
    /// * `ChatMessage` - New chat message instance
    pub fn new(role: &str, content: &str) -> Self {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            name: None,
            tool_calls: Vec::new(),
            function_call: None,
            tool_call_id: None,
            task_references: Vec::new(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new("assistant", content)
    }

    /// Creates a tool result message
    ///
    /// # Arguments
    /// * `name` - Function or executor that produced the result
    /// * `tool_call_id` - Identifier of the call being answered, if any
    /// * `content` - Result or diagnostic text
    pub fn tool(name: &str, tool_call_id: Option<&str>, content: &str) -> Self {
        let mut message = Self::new("tool", content);
        message.name = Some(name.to_string());
        message.tool_call_id = tool_call_id.map(str::to_string);
        message
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_function_call(mut self, name: &str, arguments: &str) -> Self {
        self.function_call = Some(FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
        self
    }

    /// Whether the message asks for at least one function invocation
    pub fn requests_functions(&self) -> bool {
        !self.tool_calls.is_empty() || self.function_call.is_some()
    }
}
