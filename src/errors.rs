/// Errors raised while loading, validating and executing tasks.
///
/// Only the variants marked fatal ever escape a task run. Tool and code
/// execution failures are turned into conversation messages by the turn
/// engine so the agent can correct itself on the next turn.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown task or route, bad input, unroutable exit code, invalid definition (fatal)
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A non-recursive task tried to re-enter itself (fatal)
    #[error("Recursion error: task '{task_name}' is not recursive and is already in the execution history")]
    Recursion { task_name: String },
    /// A required API is inactive or unhealthy (fatal)
    #[error("External API '{api}' unavailable: {reason}")]
    ExternalApiUnavailable { api: String, reason: String },
    /// A tool invocation failed
    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },
    /// The sandbox could not run a code block
    #[error("Code execution failed ({language}): {reason}")]
    CodeExecution { language: String, reason: String },
    /// The agent produced no reply (fatal)
    #[error("Agent '{agent}' returned no response")]
    ModelNoResponse { agent: String },
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for building a configuration error from anything displayable
    pub fn config(message: impl std::fmt::Display) -> Self {
        Error::Configuration(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
