use super::{Settings, TaskDefinition};
use crate::errors::{Error, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::info;

/// Loads task definitions from a YAML or JSON file
///
/// The file holds a list of definitions. `.json` files are read as JSON,
/// anything else as YAML.
///
/// # Arguments
///
/// * `file_path` - Path to the definitions file
///
/// # Returns
///
/// * `Result<Vec<TaskDefinition>>` - The parsed definitions on success
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be read
/// * The content cannot be parsed into definitions (including unknown task types)
pub fn load_task_definitions(file_path: &Path) -> Result<Vec<TaskDefinition>> {
    let content = fs::read_to_string(file_path)?;
    let is_json = file_path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let definitions = parse_task_definitions(&content, is_json)?;
    info!(
        "Loaded {} task definitions from {}",
        definitions.len(),
        file_path.display()
    );
    Ok(definitions)
}

/// Parses a list of task definitions from a string
pub fn parse_task_definitions(content: &str, is_json: bool) -> Result<Vec<TaskDefinition>> {
    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Loads engine settings from a TOML file
pub fn load_settings(file_path: &Path) -> Result<Settings> {
    let toml_str = fs::read_to_string(file_path)?;
    let settings: Settings = toml::from_str(&toml_str)?;
    info!(
        "Loaded settings with {} API entries",
        settings.apis.len()
    );
    Ok(settings)
}

/// Parses a human readable duration such as "30s" or "2m"
pub fn parse_duration(value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| Error::config(format!("invalid duration '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskType;
    use std::io::Write;

    const DEFINITIONS: &str = r#"
- task_type: PromptAgentTask
  task_name: summarize
  task_description: Summarize a text
  input_variables:
    properties:
      prompt:
        type: string
        description: Text to summarize
    required: [prompt]
  timeout: 45s
- task_type: Workflow
  task_name: pipeline
  tasks:
    summarize: summarize
  start_task: summarize
  tasks_end_code_routing:
    summarize:
      0: [null, false]
      1: [summarize, true]
  max_attempts: 2
"#;

    #[test]
    fn loads_yaml_definitions() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(DEFINITIONS.as_bytes()).unwrap();

        let definitions = load_task_definitions(file.path()).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].task_type, TaskType::PromptAgentTask);
        assert!(definitions[0].recursive);
        assert_eq!(definitions[0].timeout.as_deref(), Some("45s"));

        let routing = &definitions[1].tasks_end_code_routing["summarize"];
        assert_eq!(routing[&0], (None, false));
        assert_eq!(routing[&1], (Some("summarize".to_string()), true));
        assert_eq!(definitions[1].max_attempts, Some(2));
    }

    #[test]
    fn loads_json_definitions() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(
            br#"[{"task_type": "CheckTask", "task_name": "check",
                  "exit_code_response_map": {"PASSED": 0, "FAILED": 1}}]"#,
        )
        .unwrap();

        let definitions = load_task_definitions(file.path()).unwrap();
        assert_eq!(definitions[0].exit_code_response_map["PASSED"], 0);
    }

    #[test]
    fn unknown_task_type_fails_to_load() {
        let err = parse_task_definitions("- task_type: MagicTask\n  task_name: x\n", false)
            .unwrap_err();
        assert!(matches!(err, Error::YamlError(_)));
    }

    #[test]
    fn loads_toml_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[apis.search]
active = true
health = "healthy"

[sandbox]
timeout = "5s"

[conversation]
max_recursion_depth = 4
"#,
        )
        .unwrap();

        let settings = load_settings(file.path()).unwrap();
        assert!(settings.apis["search"].active);
        assert_eq!(
            parse_duration(settings.sandbox.timeout.as_deref().unwrap()).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(settings.conversation.max_recursion_depth, Some(4));
    }
}
