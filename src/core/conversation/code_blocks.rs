use super::ConversationTurnEngine;
use crate::event::Event;
use crate::llm::ChatMessage;
use crate::modules::{CodeOutcome, CodeSandbox};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Fenced block: info string on the opening fence line, body up to the closing fence
static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([^\n`]*)\n(.*?)```").expect("code block pattern is valid"));

/// A block of code found in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Normalized language name
    pub language: String,
    pub code: String,
}

/// Maps language aliases to the names used for execution
pub fn normalize_language(raw: &str) -> String {
    let lang = raw.trim().to_lowercase();
    match lang.as_str() {
        "py" | "python3" | "python" => "python".to_string(),
        "sh" | "bash" | "shell" | "console" => "shell".to_string(),
        _ => lang,
    }
}

/// Extracts the fenced blocks of `text` written in one of `valid_languages`.
///
/// Blocks in other languages (or with no language) are dropped with a
/// warning. Kept blocks of the same language are merged into one when they
/// directly follow each other in the text; a dropped block in between keeps
/// them apart.
pub fn extract_code_blocks(text: &str, valid_languages: &[String]) -> Vec<CodeBlock> {
    let valid: Vec<String> = valid_languages.iter().map(|l| normalize_language(l)).collect();
    let mut blocks: Vec<CodeBlock> = Vec::new();
    // Position, among all fenced blocks, of the last kept one
    let mut last_kept: Option<usize> = None;

    for (position, captures) in CODE_BLOCK_RE.captures_iter(text).enumerate() {
        let info = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let raw_language = info.split_whitespace().next().unwrap_or_default();
        let language = normalize_language(raw_language);
        let code = captures
            .get(2)
            .map(|m| m.as_str().trim_end())
            .unwrap_or_default();

        if !valid.contains(&language) {
            warn!(
                "Dropping code block in unsupported language '{}'",
                if raw_language.is_empty() { "<none>" } else { raw_language }
            );
            continue;
        }
        if code.trim().is_empty() {
            continue;
        }

        let follows_last = last_kept.is_some_and(|kept| kept + 1 == position);
        last_kept = Some(position);
        match blocks.last_mut() {
            Some(last) if follows_last && last.language == language => {
                last.code.push('\n');
                last.code.push_str(code);
            }
            _ => blocks.push(CodeBlock {
                language,
                code: code.to_string(),
            }),
        }
    }

    blocks
}

/// Runs one block and renders the result as a tool message
///
/// A sandbox failure is reported in the message instead of being raised.
///
/// # Returns
/// * `(ChatMessage, Option<CodeOutcome>)` - The tool message, and the outcome when the code ran
pub async fn run_code_block(
    sandbox: &dyn CodeSandbox,
    executor_name: &str,
    block: &CodeBlock,
) -> (ChatMessage, Option<CodeOutcome>) {
    match sandbox.execute(&block.code, &block.language).await {
        Ok(outcome) => {
            debug!(
                "{} block finished with exit code {}",
                block.language, outcome.exit_code
            );
            (
                ChatMessage::tool(executor_name, None, &outcome.render()),
                Some(outcome),
            )
        }
        Err(e) => {
            warn!("{} block could not be executed: {}", block.language, e);
            (
                ChatMessage::tool(executor_name, None, &format!("Error: {}", e)),
                None,
            )
        }
    }
}

impl ConversationTurnEngine {
    /// Runs merged code blocks through the sandbox, one tool message each
    pub async fn execute_code_blocks(&self, blocks: &[CodeBlock]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(blocks.len());
        for block in blocks {
            let (message, outcome) =
                run_code_block(self.runtime.sandbox.as_ref(), &self.executor.name, block).await;
            if let Some(outcome) = &outcome {
                self.runtime.emit(Event::CodeExecuted {
                    language: block.language.clone(),
                    exit_code: outcome.exit_code,
                });
            }
            messages.push(message);
        }
        messages
    }
}
