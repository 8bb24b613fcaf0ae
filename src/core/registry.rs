use super::conversation::ConversationSettings;
use super::task::{Task, TaskKind};
use super::variants::{sorted_markers, AgentTask, OutcomeStrategy, PromptStrategy, TurnPolicy};
use super::workflow::{Route, RoutingTable, Workflow};
use super::{InputSchema, ParameterDefinition, ParameterType};
use crate::config::{parse_duration, ConversationDefaults, TaskDefinition, TaskType};
use crate::constants::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RECURSION_DEPTH, DEFAULT_TERMINATION_SENTINEL,
    DEFAULT_VALID_LANGUAGES, EXECUTION_FAILED_LABEL, FAILED_LABEL, GENERATION_FAILED_LABEL,
    MESSAGES_INPUT, NO_CODE_LABEL, PROMPT_INPUT, SUCCESS_LABEL, TIMEOUT_LABEL,
};
use crate::errors::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validated tasks built from definitions, addressable by name.
///
/// Every structural problem (unknown references, cycles, unroutable exit
/// codes, bad schemas) is reported here, before anything runs.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Arc<Task>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl TaskRegistry {
    pub fn from_definitions(definitions: Vec<TaskDefinition>) -> Result<Self> {
        Self::with_defaults(definitions, &ConversationDefaults::default())
    }

    /// Builds every definition, filling unset conversation knobs from `defaults`
    ///
    /// # Arguments
    /// * `definitions` - Task definitions, in any order
    /// * `defaults` - Engine-wide conversation fallbacks
    ///
    /// # Returns
    /// * `Result<Self>` - The registry, or the first configuration error found
    pub fn with_defaults(definitions: Vec<TaskDefinition>, defaults: &ConversationDefaults) -> Result<Self> {
        let mut by_name: HashMap<String, TaskDefinition> = HashMap::new();
        for definition in definitions {
            if by_name.contains_key(&definition.task_name) {
                return Err(Error::config(format!(
                    "duplicate task name '{}'",
                    definition.task_name
                )));
            }
            by_name.insert(definition.task_name.clone(), definition);
        }

        let mut names: Vec<&String> = by_name.keys().collect();
        names.sort();

        for definition in by_name.values() {
            for (key, target) in &definition.tasks {
                if !by_name.contains_key(target) {
                    return Err(Error::config(format!(
                        "task '{}': sub-task '{}' refers to unknown task '{}'",
                        definition.task_name, key, target
                    )));
                }
            }
        }

        let mut visits = HashMap::new();
        for name in names.iter().copied() {
            let mut path = Vec::new();
            detect_cycle(name, &by_name, &mut visits, &mut path)?;
        }

        let mut builder = Builder {
            definitions: &by_name,
            defaults,
            built: BTreeMap::new(),
        };
        for name in names {
            builder.build(name)?;
        }

        info!("Registered {} tasks", builder.built.len());
        Ok(TaskRegistry {
            tasks: builder.built,
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|n| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Depth-first walk over sub-task references, failing on the first back edge
fn detect_cycle<'a>(
    name: &'a str,
    definitions: &'a HashMap<String, TaskDefinition>,
    visits: &mut HashMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    match visits.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let start = path.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<&str> = path[start..].to_vec();
            cycle.push(name);
            return Err(Error::config(format!(
                "cycle detected: {}",
                cycle.join(" -> ")
            )));
        }
        None => {}
    }

    visits.insert(name, Visit::InProgress);
    path.push(name);
    if let Some(definition) = definitions.get(name) {
        for target in definition.tasks.values() {
            detect_cycle(target, definitions, visits, path)?;
        }
    }
    path.pop();
    visits.insert(name, Visit::Done);
    Ok(())
}

struct Builder<'a> {
    definitions: &'a HashMap<String, TaskDefinition>,
    defaults: &'a ConversationDefaults,
    built: BTreeMap<String, Arc<Task>>,
}

impl Builder<'_> {
    /// Builds a task after its sub-tasks; shared sub-tasks are built once
    fn build(&mut self, name: &str) -> Result<Arc<Task>> {
        if let Some(task) = self.built.get(name) {
            return Ok(Arc::clone(task));
        }
        let definitions = self.definitions;
        let definition = definitions
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown task '{}'", name)))?;

        let mut tasks = BTreeMap::new();
        for (key, target) in &definition.tasks {
            tasks.insert(key.clone(), self.build(target)?);
        }

        let task = Arc::new(build_task(definition, tasks, self.defaults)?);
        debug!("Built task '{}' ({})", task.name, task.task_type);
        self.built.insert(name.to_string(), Arc::clone(&task));
        Ok(task)
    }
}

fn labels(entries: &[(i32, &str)]) -> BTreeMap<i32, String> {
    entries
        .iter()
        .map(|(code, label)| (*code, label.to_string()))
        .collect()
}

fn default_exit_codes(task_type: TaskType) -> BTreeMap<i32, String> {
    match task_type {
        TaskType::Workflow | TaskType::CheckTask => {
            labels(&[(0, SUCCESS_LABEL), (1, FAILED_LABEL)])
        }
        TaskType::BasicAgentTask | TaskType::PromptAgentTask | TaskType::AgentWithFunctions => {
            labels(&[(0, SUCCESS_LABEL), (1, GENERATION_FAILED_LABEL)])
        }
        TaskType::CodeGenerationLLMTask => labels(&[
            (0, SUCCESS_LABEL),
            (1, GENERATION_FAILED_LABEL),
            (2, NO_CODE_LABEL),
        ]),
        TaskType::CodeExecutionLLMTask => labels(&[
            (0, SUCCESS_LABEL),
            (1, EXECUTION_FAILED_LABEL),
            (2, NO_CODE_LABEL),
            (3, TIMEOUT_LABEL),
        ]),
    }
}

fn default_input_schema(definition: &TaskDefinition) -> InputSchema {
    match definition.task_type {
        TaskType::Workflow => InputSchema::default(),
        TaskType::BasicAgentTask => InputSchema::single(
            MESSAGES_INPUT,
            ParameterDefinition::new(ParameterType::Array, "Conversation to answer"),
            true,
        ),
        TaskType::CodeExecutionLLMTask => InputSchema::single(
            MESSAGES_INPUT,
            ParameterDefinition::new(ParameterType::Array, "Messages holding the code to run"),
            false,
        ),
        // A template names its own variables
        _ if definition.prompt_template.is_some() => InputSchema::default(),
        _ => InputSchema::single(
            PROMPT_INPUT,
            ParameterDefinition::new(ParameterType::String, "Prompt for the agent"),
            true,
        ),
    }
}

fn conversation_settings(definition: &TaskDefinition, defaults: &ConversationDefaults) -> Result<ConversationSettings> {
    let max_recursion_depth = definition
        .max_recursion_depth
        .or(defaults.max_recursion_depth)
        .unwrap_or(DEFAULT_MAX_RECURSION_DEPTH);
    if max_recursion_depth == 0 {
        return Err(Error::config(format!(
            "task '{}': max_recursion_depth must be at least 1",
            definition.task_name
        )));
    }

    Ok(ConversationSettings {
        max_recursion_depth,
        termination_sentinel: definition
            .termination_sentinel
            .clone()
            .or_else(|| defaults.termination_sentinel.clone())
            .unwrap_or_else(|| DEFAULT_TERMINATION_SENTINEL.to_string()),
        execute_code: definition.execute_code,
        valid_languages: definition.valid_languages.clone().unwrap_or_else(|| {
            DEFAULT_VALID_LANGUAGES.iter().map(|l| l.to_string()).collect()
        }),
        return_output_to_agent: definition.return_output_to_agent,
    })
}

fn build_task(
    definition: &TaskDefinition,
    tasks: BTreeMap<String, Arc<Task>>,
    defaults: &ConversationDefaults,
) -> Result<Task> {
    let name = &definition.task_name;

    let exit_codes = definition
        .exit_codes
        .clone()
        .unwrap_or_else(|| default_exit_codes(definition.task_type));
    if !exit_codes.contains_key(&0) {
        return Err(Error::config(format!("task '{}': exit code 0 is not declared", name)));
    }
    if !exit_codes.keys().any(|code| *code != 0) {
        return Err(Error::config(format!("task '{}': no failure exit code declared", name)));
    }

    let input_schema = definition
        .input_variables
        .clone()
        .unwrap_or_else(|| default_input_schema(definition));
    input_schema.validate_definition(name)?;

    let timeout = definition
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    if definition.task_type != TaskType::Workflow
        && (definition.start_task.is_some() || !definition.tasks_end_code_routing.is_empty())
    {
        warn!("Task '{}': routing is ignored for {} tasks", name, definition.task_type);
    }

    let template = || PromptStrategy::Template {
        system_prompt: definition.system_prompt.clone(),
        template: definition.prompt_template.clone(),
    };
    let agent_task = |prompt, outcome, turns| -> Result<TaskKind> {
        Ok(TaskKind::Agent(AgentTask {
            prompt,
            outcome,
            turns,
            agent: definition.agent.clone(),
            execution_agent: definition.execution_agent.clone(),
            conversation: conversation_settings(definition, defaults)?,
        }))
    };

    let kind = match definition.task_type {
        TaskType::Workflow => TaskKind::Workflow(build_workflow(definition, &tasks)?),
        TaskType::BasicAgentTask => agent_task(
            PromptStrategy::MessageList,
            OutcomeStrategy::Generation,
            TurnPolicy::SingleTurn,
        )?,
        TaskType::PromptAgentTask => {
            agent_task(template(), OutcomeStrategy::Generation, TurnPolicy::SingleTurn)?
        }
        TaskType::AgentWithFunctions => {
            agent_task(template(), OutcomeStrategy::Generation, TurnPolicy::Conversation)?
        }
        TaskType::CheckTask => {
            if definition.exit_code_response_map.is_empty() {
                return Err(Error::config(format!(
                    "task '{}': check tasks need an exit_code_response_map",
                    name
                )));
            }
            for (marker, code) in &definition.exit_code_response_map {
                if !exit_codes.contains_key(code) {
                    return Err(Error::config(format!(
                        "task '{}': marker '{}' maps to undeclared exit code {}",
                        name, marker, code
                    )));
                }
            }
            let markers = sorted_markers(
                definition
                    .exit_code_response_map
                    .iter()
                    .map(|(marker, code)| (marker.clone(), *code)),
            );
            agent_task(template(), OutcomeStrategy::Markers(markers), TurnPolicy::SingleTurn)?
        }
        TaskType::CodeGenerationLLMTask => agent_task(
            template(),
            OutcomeStrategy::CodeGeneration,
            TurnPolicy::SingleTurn,
        )?,
        TaskType::CodeExecutionLLMTask => agent_task(
            PromptStrategy::PriorMessages,
            OutcomeStrategy::CodeExecution,
            TurnPolicy::SandboxOnly,
        )?,
    };

    if let TaskKind::Agent(agent) = &kind {
        let missing = agent
            .outcome
            .produced_codes()
            .into_iter()
            .find(|code| !exit_codes.contains_key(code));
        if let Some(code) = missing {
            return Err(Error::config(format!(
                "task '{}': {} tasks can exit with code {}, which is not declared",
                name, definition.task_type, code
            )));
        }
    }

    Ok(Task {
        id: definition.task_id.clone(),
        name: name.clone(),
        description: definition.task_description.clone(),
        task_type: definition.task_type,
        input_schema,
        exit_codes,
        recursive: definition.recursive,
        required_apis: definition.required_apis.clone(),
        timeout,
        tasks,
        kind,
    })
}

fn build_workflow(definition: &TaskDefinition, tasks: &BTreeMap<String, Arc<Task>>) -> Result<Workflow> {
    let name = &definition.task_name;
    let start_task = definition
        .start_task
        .as_ref()
        .ok_or_else(|| Error::config(format!("workflow '{}' has no start_task", name)))?;
    if !tasks.contains_key(start_task) {
        return Err(Error::config(format!(
            "workflow '{}': start task '{}' is not one of its tasks",
            name, start_task
        )));
    }

    let mut routing = RoutingTable::new();
    for (step, codes) in &definition.tasks_end_code_routing {
        let child = tasks.get(step).ok_or_else(|| {
            Error::config(format!(
                "workflow '{}': routing refers to unknown task '{}'",
                name, step
            ))
        })?;

        let mut routes = BTreeMap::new();
        for (code, (next, is_retry)) in codes {
            if !child.exit_codes.contains_key(code) {
                return Err(Error::config(format!(
                    "workflow '{}': task '{}' has no exit code {}",
                    name, step, code
                )));
            }
            if let Some(next) = next {
                if !tasks.contains_key(next) {
                    return Err(Error::config(format!(
                        "workflow '{}': exit code {} of '{}' routes to unknown task '{}'",
                        name, code, step, next
                    )));
                }
            }
            routes.insert(
                *code,
                Route {
                    next: next.clone(),
                    is_retry: *is_retry,
                },
            );
        }
        routing.insert(step.clone(), routes);
    }

    Ok(Workflow {
        start_task: Some(start_task.clone()),
        routing,
        max_attempts: definition.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        selector: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_task_definitions;

    fn registry(yaml: &str) -> Result<TaskRegistry> {
        TaskRegistry::from_definitions(parse_task_definitions(yaml, false)?)
    }

    const PIPELINE: &str = r#"
- task_type: CodeGenerationLLMTask
  task_name: write
  prompt_template: "Write code for {{ goal }}"
  input_variables:
    properties:
      goal:
        type: string
    required: [goal]
- task_type: CodeExecutionLLMTask
  task_name: run
- task_type: Workflow
  task_name: build
  tasks:
    write: write
    run: run
  start_task: write
  tasks_end_code_routing:
    write:
      0: [run, false]
      2: [write, true]
    run:
      0: [null, false]
      1: [write, true]
  max_attempts: 2
"#;

    #[test]
    fn builds_workflow_with_shared_children() {
        let registry = registry(PIPELINE).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["build", "run", "write"]);

        let build = registry.get("build").unwrap();
        let TaskKind::Workflow(workflow) = &build.kind else {
            panic!("expected a workflow");
        };
        assert_eq!(workflow.max_attempts, 2);
        assert_eq!(workflow.routing["write"][&2], Route::retry("write"));
        assert_eq!(workflow.routing["run"][&0], Route::end());
        assert!(Arc::ptr_eq(&build.tasks["write"], &registry.get("write").unwrap()));

        let run = registry.get("run").unwrap();
        assert_eq!(run.exit_codes.len(), 4);
        assert!(!run.input_schema.is_required("messages"));
    }

    #[test]
    fn rejects_cycles() {
        let yaml = r#"
- task_type: AgentWithFunctions
  task_name: a
  tasks: { b: b }
- task_type: AgentWithFunctions
  task_name: b
  tasks: { a: a }
"#;
        let err = registry(yaml).unwrap_err();
        assert!(err.to_string().contains("cycle detected: a -> b -> a"));
    }

    #[test]
    fn rejects_duplicates_and_unknown_references() {
        let duplicate = r#"
- { task_type: PromptAgentTask, task_name: x }
- { task_type: PromptAgentTask, task_name: x }
"#;
        assert!(registry(duplicate).unwrap_err().to_string().contains("duplicate task name 'x'"));

        let unknown = r#"
- task_type: AgentWithFunctions
  task_name: x
  tasks: { helper: ghost }
"#;
        assert!(registry(unknown).unwrap_err().to_string().contains("unknown task 'ghost'"));
    }

    #[test]
    fn rejects_routes_on_undeclared_exit_codes() {
        let yaml = PIPELINE.replace("2: [write, true]", "5: [write, true]");
        let err = registry(&yaml).unwrap_err();
        assert!(err.to_string().contains("task 'write' has no exit code 5"));
    }

    #[test]
    fn rejects_routes_to_unknown_steps() {
        let yaml = PIPELINE.replace("0: [run, false]", "0: [deploy, false]");
        let err = registry(&yaml).unwrap_err();
        assert!(err.to_string().contains("routes to unknown task 'deploy'"));
    }

    #[test]
    fn check_markers_are_sorted_and_validated() {
        let yaml = r#"
- task_type: CheckTask
  task_name: verify
  exit_code_response_map:
    PASSED: 0
    NOT PASSED: 1
"#;
        let built = registry(yaml).unwrap();
        let verify = built.get("verify").unwrap();
        let TaskKind::Agent(agent) = &verify.kind else {
            panic!("expected an agent task");
        };
        assert_eq!(
            agent.outcome,
            OutcomeStrategy::Markers(vec![("NOT PASSED".into(), 1), ("PASSED".into(), 0)])
        );

        let bad = yaml.replace("NOT PASSED: 1", "NOT PASSED: 4");
        assert!(registry(&bad).is_err());
    }

    #[test]
    fn exit_code_table_needs_a_failure_code() {
        let yaml = r#"
- task_type: PromptAgentTask
  task_name: p
  exit_codes: { 0: Success }
"#;
        assert!(registry(yaml).unwrap_err().to_string().contains("no failure exit code"));
    }

    #[test]
    fn exit_code_table_covers_variant_codes() {
        let yaml = r#"
- task_type: CodeGenerationLLMTask
  task_name: gen
  exit_codes: { 0: ok, 1: failed }
"#;
        let err = registry(yaml).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("can exit with code 2"));

        let yaml = r#"
- task_type: CodeExecutionLLMTask
  task_name: run
  exit_codes: { 0: ok, 1: failed, 2: no code }
"#;
        assert!(registry(yaml).unwrap_err().to_string().contains("can exit with code 3"));

        let yaml = r#"
- task_type: PromptAgentTask
  task_name: p
  exit_codes: { 0: ok, 4: rejected }
"#;
        assert!(registry(yaml).unwrap_err().to_string().contains("can exit with code 1"));

        let yaml = r#"
- task_type: CodeGenerationLLMTask
  task_name: gen
  exit_codes: { 0: ok, 1: failed, 2: no code, 7: extra }
"#;
        assert!(registry(yaml).is_ok());
    }

    #[test]
    fn conversation_defaults_fill_unset_knobs() {
        let defs = parse_task_definitions(
            "- { task_type: AgentWithFunctions, task_name: chat, timeout: 2m }",
            false,
        )
        .unwrap();
        let defaults = ConversationDefaults {
            max_recursion_depth: Some(7),
            termination_sentinel: Some("DONE".into()),
        };
        let registry = TaskRegistry::with_defaults(defs, &defaults).unwrap();
        let chat = registry.get("chat").unwrap();
        assert_eq!(chat.timeout, Some(std::time::Duration::from_secs(120)));
        let TaskKind::Agent(agent) = &chat.kind else {
            panic!("expected an agent task");
        };
        assert_eq!(agent.conversation.max_recursion_depth, 7);
        assert_eq!(agent.conversation.termination_sentinel, "DONE");
        assert_eq!(agent.turns, TurnPolicy::Conversation);
    }
}
