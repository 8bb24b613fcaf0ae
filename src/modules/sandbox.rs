use crate::constants::DEFAULT_SANDBOX_TIMEOUT_SECS;
use crate::errors::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Exit code reported when the sandbox kills a run for exceeding its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Result of running one block of code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeOutcome {
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub logs: String,
    pub timed_out: bool,
}

impl CodeOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Text handed back to the agent after an execution
    pub fn render(&self) -> String {
        let status = if self.timed_out {
            "timed out"
        } else if self.exit_code == 0 {
            "execution succeeded"
        } else {
            "execution failed"
        };
        format!(
            "exitcode: {} ({})\nCode output:\n{}",
            self.exit_code, status, self.logs
        )
    }
}

/// Code execution capability
#[async_trait::async_trait]
pub trait CodeSandbox: std::fmt::Debug + Send + Sync {
    /// Runs `code` written in `language`
    ///
    /// # Arguments
    /// * `code` - Source to execute
    /// * `language` - Normalized language name (e.g. "python", "shell")
    ///
    /// # Returns
    /// * `Result<CodeOutcome>` - Exit code and logs, or a `CodeExecution` error when it could not run at all
    async fn execute(&self, code: &str, language: &str) -> Result<CodeOutcome>;
}

/// Sandbox running code in local subprocesses
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    /// Maximum wall time of a single run
    pub timeout: Duration,
    /// Working directory of the spawned process, current directory when unset
    pub work_dir: Option<PathBuf>,
}

impl Default for LocalSandbox {
    fn default() -> Self {
        LocalSandbox {
            timeout: Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS),
            work_dir: None,
        }
    }
}

impl LocalSandbox {
    pub fn new(timeout: Duration, work_dir: Option<PathBuf>) -> Self {
        LocalSandbox { timeout, work_dir }
    }

    /// Maps a language to the interpreter invocation running it
    fn interpreter(language: &str) -> Option<(&'static str, &'static str)> {
        match language {
            "python" => Some(("python3", "-c")),
            "shell" => Some(("sh", "-c")),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl CodeSandbox for LocalSandbox {
    async fn execute(&self, code: &str, language: &str) -> Result<CodeOutcome> {
        let (program, flag) = Self::interpreter(language).ok_or_else(|| Error::CodeExecution {
            language: language.to_string(),
            reason: "no interpreter for this language".to_string(),
        })?;

        debug!("Running {} code with {} ({} bytes)", language, program, code.len());

        let mut command = Command::new(program);
        command
            .arg(flag)
            .arg(code)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.work_dir {
            command.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output.map_err(|e| Error::CodeExecution {
                language: language.to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!("{} execution timed out after {:?}", language, self.timeout);
                return Ok(CodeOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    logs: format!("Timeout after {}", humantime::format_duration(self.timeout)),
                    timed_out: true,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let logs = if !stderr.trim().is_empty() {
            info!("STDOUT:\n{}\n\nSTDERR:\n{}", stdout, stderr);
            format!("STDOUT:\n{}\n\nSTDERR:\n{}", stdout, stderr)
        } else {
            stdout
        };

        Ok(CodeOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            logs,
            timed_out: false,
        })
    }
}
