use super::task::{RunOutput, Task};
use super::{ExecutionHistory, Runtime, TaskOutputs, TaskResponse, TaskStatus, UsageMetrics};
use crate::constants::{DEFAULT_MAX_ATTEMPTS, STEP_OUTPUTS_INPUT, WORKFLOW_OUTPUT_SUFFIX};
use crate::errors::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an exit code of a step leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Next step, or `None` to end the workflow
    pub next: Option<String>,
    /// Following this route consumes one attempt of the retry budget
    pub is_retry: bool,
}

impl Route {
    pub fn to(next: &str) -> Self {
        Route {
            next: Some(next.to_string()),
            is_retry: false,
        }
    }

    pub fn retry(next: &str) -> Self {
        Route {
            next: Some(next.to_string()),
            is_retry: true,
        }
    }

    pub fn end() -> Self {
        Route {
            next: None,
            is_retry: false,
        }
    }
}

/// Step name -> exit code -> route
pub type RoutingTable = BTreeMap<String, BTreeMap<i32, Route>>;

/// The step a workflow runs next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextTask {
    pub name: String,
    pub is_retry: bool,
}

/// Replaces routing-table lookups with custom selection logic
pub trait TaskSelector: Debug + Send + Sync {
    /// Picks the step to run after `last`, `None` ending the workflow
    ///
    /// # Arguments
    /// * `last` - Name and response of the step that just ran; `None` before the first
    ///   step of a workflow without a start task
    /// * `results` - Every response so far, in execution order
    fn select(
        &self,
        last: Option<(&str, &TaskResponse)>,
        results: &[TaskResponse],
    ) -> Result<Option<NextTask>>;
}

/// Routing state machine over the sub-tasks of a task
#[derive(Debug, Clone)]
pub struct Workflow {
    pub start_task: Option<String>,
    pub routing: RoutingTable,
    /// Retry budget shared by every retry route of one run
    pub max_attempts: usize,
    pub selector: Option<Arc<dyn TaskSelector>>,
}

impl Workflow {
    pub fn new(start_task: &str, routing: RoutingTable) -> Self {
        Workflow {
            start_task: Some(start_task.to_string()),
            routing,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            selector: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn TaskSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Determines the next step from the last step's exit code
    ///
    /// # Arguments
    /// * `last` - Name and response of the step that just ran; `None` to get the entry
    ///   step, which is `start_task` when set and the selector's choice otherwise
    /// * `results` - Every response so far
    ///
    /// # Returns
    /// * `Result<Option<NextTask>>` - The next step, `None` at a terminal route, or a
    ///   configuration error when the step or its exit code has no route
    pub fn select_next_task(
        &self,
        last: Option<(&str, &TaskResponse)>,
        results: &[TaskResponse],
    ) -> Result<Option<NextTask>> {
        let Some((name, response)) = last else {
            if let Some(start) = &self.start_task {
                return Ok(Some(NextTask {
                    name: start.clone(),
                    is_retry: false,
                }));
            }
            return match &self.selector {
                Some(selector) => selector.select(None, results),
                None => Err(Error::config("workflow has no start task")),
            };
        };

        if let Some(selector) = &self.selector {
            return selector.select(last, results);
        }

        let routes = self
            .routing
            .get(name)
            .ok_or_else(|| Error::config(format!("no routing defined for task '{}'", name)))?;
        let route = routes.get(&response.result_code).ok_or_else(|| {
            Error::config(format!(
                "no route for exit code {} of task '{}'",
                response.result_code, name
            ))
        })?;

        Ok(route.next.as_ref().map(|next| NextTask {
            name: next.clone(),
            is_retry: route.is_retry,
        }))
    }

    /// Runs steps until a terminal route is reached
    ///
    /// Each step sees the workflow inputs plus the `<step>_output` text of
    /// every step that ran before it. The same texts are listed under
    /// `step_outputs` in the order the steps last ran. A routing error ends
    /// the run as a failure that still carries the finished steps.
    ///
    /// # Arguments
    /// * `task` - Owning task providing the steps and the exit code table
    /// * `runtime` - Collaborators handed to every step
    /// * `inputs` - Resolved workflow inputs
    /// * `history` - Call chain including the owning task
    pub(crate) async fn run(
        &self,
        task: &Task,
        runtime: &Runtime,
        inputs: &Map<String, Value>,
        history: &ExecutionHistory,
    ) -> Result<RunOutput> {
        let mut context = inputs.clone();
        let mut results: Vec<TaskResponse> = Vec::new();
        let mut usage = UsageMetrics::default();
        let mut step_outputs: Vec<(String, String)> = Vec::new();
        let mut attempts = 0;

        let mut next = match self.select_next_task(None, &results) {
            Ok(next) => next,
            Err(e) => return Ok(routing_failure(task, results, usage, e)),
        };
        while let Some(step) = next {
            if step.is_retry {
                attempts += 1;
                if attempts > self.max_attempts {
                    warn!(
                        "Workflow '{}': retry budget of {} exhausted at '{}'",
                        task.name, self.max_attempts, step.name
                    );
                    return Ok(RunOutput {
                        status: TaskStatus::Failed,
                        result_code: task.failure_code(),
                        outputs: Some(TaskOutputs::Workflow(results)),
                        diagnostic: Some(format!(
                            "Maximum attempts ({}) reached while retrying '{}'",
                            self.max_attempts, step.name
                        )),
                        usage,
                    });
                }
                info!(
                    "Workflow '{}': retrying '{}' (attempt {}/{})",
                    task.name, step.name, attempts, self.max_attempts
                );
            }

            let Some(child) = task.tasks.get(&step.name) else {
                let e = Error::config(format!(
                    "workflow '{}' routes to unknown task '{}'",
                    task.name, step.name
                ));
                return Ok(routing_failure(task, results, usage, e));
            };

            debug!("Workflow '{}': running '{}'", task.name, step.name);
            let response = child.execute(runtime, context.clone(), history).await;
            usage.absorb(&response.usage_metrics);

            let output = response.output_text();
            step_outputs.retain(|(name, _)| name != &step.name);
            step_outputs.push((step.name.clone(), output.clone()));
            context.insert(
                format!("{}{}", step.name, WORKFLOW_OUTPUT_SUFFIX),
                Value::String(output),
            );
            context.insert(
                STEP_OUTPUTS_INPUT.to_string(),
                Value::Array(
                    step_outputs
                        .iter()
                        .map(|(name, output)| json!({"task": name, "output": output}))
                        .collect(),
                ),
            );
            results.push(response);

            let selected = self.select_next_task(
                results.last().map(|r| (step.name.as_str(), r)),
                &results,
            );
            next = match selected {
                Ok(next) => next,
                Err(e) => return Ok(routing_failure(task, results, usage, e)),
            };
        }

        let (status, result_code) = match results.last() {
            Some(last) if last.status == TaskStatus::Complete && last.result_code == 0 => {
                (TaskStatus::Complete, 0)
            }
            Some(last) => (last.status, task.failure_code()),
            None => (TaskStatus::Complete, 0),
        };

        Ok(RunOutput {
            status,
            result_code,
            outputs: Some(TaskOutputs::Workflow(results)),
            diagnostic: None,
            usage,
        })
    }
}

fn routing_failure(
    task: &Task,
    results: Vec<TaskResponse>,
    usage: UsageMetrics,
    error: Error,
) -> RunOutput {
    warn!("Workflow '{}' stopped: {}", task.name, error);
    RunOutput {
        status: TaskStatus::Failed,
        result_code: task.failure_code(),
        outputs: Some(TaskOutputs::Workflow(results)),
        diagnostic: Some(error.to_string()),
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ReplayAgent;
    use crate::config::TaskType;
    use crate::core::conversation::ConversationSettings;
    use crate::core::task::TaskKind;
    use crate::core::variants::{sorted_markers, AgentTask, OutcomeStrategy, PromptStrategy, TurnPolicy};
    use crate::modules::{LocalSandbox, StaticApiRegistry};

    fn check_task(name: &str) -> Arc<Task> {
        let mut task = Task::new(
            name,
            TaskType::CheckTask,
            TaskKind::Agent(AgentTask {
                prompt: PromptStrategy::Template {
                    system_prompt: None,
                    template: Some(format!("Check step {}", name)),
                },
                outcome: OutcomeStrategy::Markers(sorted_markers(vec![
                    ("PASS".to_string(), 0),
                    ("FAIL".to_string(), 1),
                ])),
                turns: TurnPolicy::SingleTurn,
                agent: None,
                execution_agent: None,
                conversation: ConversationSettings::default(),
            }),
        );
        task.exit_codes.insert(1, "Check failed".into());
        Arc::new(task)
    }

    fn workflow_task(workflow: Workflow) -> Task {
        let mut task = Task::new("pipeline", TaskType::Workflow, TaskKind::Workflow(workflow));
        task.tasks.insert("A".into(), check_task("A"));
        task.tasks.insert("B".into(), check_task("B"));
        task
    }

    fn routing() -> RoutingTable {
        BTreeMap::from([
            (
                "A".to_string(),
                BTreeMap::from([(0, Route::to("B")), (1, Route::retry("A"))]),
            ),
            ("B".to_string(), BTreeMap::from([(0, Route::end())])),
        ])
    }

    fn runtime(replies: &[&str]) -> (Runtime, Arc<ReplayAgent>) {
        let agent = Arc::new(ReplayAgent::from_texts("agent", replies));
        let runtime = Runtime::new(
            Arc::new(StaticApiRegistry::default()),
            Arc::new(LocalSandbox::default()),
        )
        .with_default_agent(agent.clone());
        (runtime, agent)
    }

    #[tokio::test]
    async fn routes_by_exit_code_and_passes_outputs_forward() {
        let (runtime, agent) = runtime(&["FAIL", "PASS", "PASS as well"]);
        let task = workflow_task(Workflow::new("A", routing()));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;

        assert_eq!(response.status, TaskStatus::Complete);
        assert_eq!(response.result_code, 0);
        let order: Vec<_> = response
            .children()
            .iter()
            .map(|r| (r.task_name.as_str(), r.result_code))
            .collect();
        assert_eq!(order, vec![("A", 1), ("A", 0), ("B", 0)]);
        assert_eq!(response.children()[2].inputs["A_output"], Value::String("PASS".into()));
        assert_eq!(response.usage_metrics.turns, 3);
        assert_eq!(agent.calls(), 3);
        assert_eq!(response.children()[0].execution_history.len(), 2);
    }

    #[tokio::test]
    async fn retry_budget_is_enforced() {
        let (runtime, agent) = runtime(&["FAIL", "FAIL", "FAIL", "FAIL"]);
        let task = workflow_task(Workflow::new("A", routing()).with_max_attempts(2));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;

        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.result_code, 1);
        assert_eq!(response.children().len(), 3);
        assert!(response
            .diagnostic
            .unwrap()
            .contains("Maximum attempts (2) reached"));
        assert_eq!(agent.calls(), 3);
    }

    #[tokio::test]
    async fn unroutable_exit_code_fails_the_workflow() {
        let (runtime, _) = runtime(&["no verdict"]);
        let mut table = routing();
        table.get_mut("A").unwrap().remove(&1);
        let task = workflow_task(Workflow::new("A", table));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.result_code, task.failure_code());
        assert_eq!(response.children().len(), 1);
        assert_eq!(response.children()[0].task_name, "A");
        assert!(response
            .diagnostic
            .unwrap()
            .contains("no route for exit code 1 of task 'A'"));
    }

    #[tokio::test]
    async fn unknown_step_keeps_finished_children() {
        let (runtime, _) = runtime(&["PASS"]);
        let mut table = routing();
        table.get_mut("A").unwrap().insert(0, Route::to("C"));
        let task = workflow_task(Workflow::new("A", table));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.children().len(), 1);
        assert!(response
            .diagnostic
            .unwrap()
            .contains("routes to unknown task 'C'"));
    }

    #[tokio::test]
    async fn step_outputs_follow_execution_order() {
        let (runtime, _) = runtime(&["PASS", "FAIL", "PASS", "PASS"]);
        let table = BTreeMap::from([
            ("B".to_string(), BTreeMap::from([(0, Route::to("A"))])),
            (
                "A".to_string(),
                BTreeMap::from([(0, Route::end()), (1, Route::retry("B"))]),
            ),
        ]);
        let task = workflow_task(Workflow::new("B", table));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert!(response.is_complete());
        assert_eq!(response.children().len(), 4);
        assert_eq!(
            response.children()[1].inputs[STEP_OUTPUTS_INPUT],
            json!([{"task": "B", "output": "PASS"}])
        );
        assert_eq!(
            response.children()[3].inputs[STEP_OUTPUTS_INPUT],
            json!([
                {"task": "A", "output": "FAIL"},
                {"task": "B", "output": "PASS"}
            ])
        );
    }

    #[tokio::test]
    async fn failed_last_step_fails_the_workflow() {
        let (runtime, _) = runtime(&["PASS", "FAIL"]);
        let mut table = routing();
        table.get_mut("B").unwrap().insert(1, Route::end());
        let task = workflow_task(Workflow::new("A", table));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.result_code, task.failure_code());
        assert!(response.diagnostic.is_none());
    }

    #[derive(Debug)]
    struct BAfterA;

    impl TaskSelector for BAfterA {
        fn select(
            &self,
            last: Option<(&str, &TaskResponse)>,
            _results: &[TaskResponse],
        ) -> Result<Option<NextTask>> {
            Ok(match last {
                None | Some(("A", _)) => Some(NextTask {
                    name: "B".into(),
                    is_retry: false,
                }),
                Some(_) => None,
            })
        }
    }

    #[tokio::test]
    async fn custom_selector_overrides_routing() {
        let (runtime, _) = runtime(&["FAIL", "PASS"]);
        let task = workflow_task(Workflow::new("A", routing()).with_selector(Arc::new(BAfterA)));

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert!(response.is_complete());
        let names: Vec<_> = response
            .children()
            .iter()
            .map(|r| r.task_name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn selector_picks_the_entry_step_without_start_task() {
        let (runtime, _) = runtime(&["PASS"]);
        let task = workflow_task(Workflow {
            start_task: None,
            routing: RoutingTable::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            selector: Some(Arc::new(BAfterA)),
        });

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert!(response.is_complete());
        assert_eq!(response.children().len(), 1);
        assert_eq!(response.children()[0].task_name, "B");
    }

    #[tokio::test]
    async fn missing_start_task_fails_without_selector() {
        let (runtime, agent) = runtime(&[]);
        let task = workflow_task(Workflow {
            start_task: None,
            routing: routing(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            selector: None,
        });

        let response = task
            .execute(&runtime, Map::new(), &ExecutionHistory::new())
            .await;
        assert_eq!(response.status, TaskStatus::Failed);
        assert!(response.children().is_empty());
        assert!(response.diagnostic.unwrap().contains("no start task"));
        assert_eq!(agent.calls(), 0);
    }
}
