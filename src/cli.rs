use crate::agents::{ReplayAgent, ScriptedReply};
use crate::config::{load_settings, load_task_definitions, Settings};
use crate::core::{ExecutionHistory, Runtime, TaskRegistry};
use crate::errors::{Error, Result};
use crate::event::Event;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Command line interface for the application
#[derive(Parser, Debug)]
#[command(name = "taskweave", version, about = "Validate and run task definitions")]
pub struct Cli {
    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    #[arg(long, global = true, default_value_t = String::from("info"))]
    pub logging_level: String,

    /// Directory receiving a daily rotating log file
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Engine settings (TOML): API statuses, sandbox, conversation defaults
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Loads the definitions and reports configuration problems
    Validate {
        /// Task definitions file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        tasks: PathBuf,
    },
    /// Prints the tool schemas a task and its sub-tasks expose to agents
    Tools {
        #[arg(short, long)]
        tasks: PathBuf,
        /// Task to describe
        #[arg(long)]
        task: String,
    },
    /// Executes a task and prints its response as JSON
    Run {
        #[arg(short, long)]
        tasks: PathBuf,
        #[arg(long)]
        task: String,
        /// Inputs as a JSON object
        #[arg(short, long)]
        inputs: Option<String>,
        /// YAML list of scripted agent replies; `null` entries produce no reply
        #[arg(short, long)]
        replies: Option<PathBuf>,
    },
}

/// Runs the selected command
pub async fn execute(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Validate { tasks } => validate(&tasks, &settings),
        Command::Tools { tasks, task } => tools(&tasks, &task, &settings),
        Command::Run {
            tasks,
            task,
            inputs,
            replies,
        } => run(&tasks, &task, inputs.as_deref(), replies.as_deref(), &settings).await,
    }
}

fn load_registry(tasks: &Path, settings: &Settings) -> Result<TaskRegistry> {
    let definitions = load_task_definitions(tasks)?;
    TaskRegistry::with_defaults(definitions, &settings.conversation)
}

fn validate(tasks: &Path, settings: &Settings) -> Result<()> {
    let registry = load_registry(tasks, settings)?;
    let runtime = Runtime::from_settings(settings)?;

    for name in registry.names() {
        let Some(task) = registry.get(name) else {
            continue;
        };
        println!("{} {} ({})", "✓".green(), task.name.bold(), task.task_type);

        let report = task.deep_validate_required_apis(runtime.apis.as_ref());
        for warning in &report.warnings {
            println!(
                "  {} {} requires '{}': {}",
                "!".yellow(),
                warning.task_name,
                warning.api,
                warning.reason
            );
        }
    }
    info!("{} task definitions are valid", registry.len());
    Ok(())
}

fn tools(tasks: &Path, name: &str, settings: &Settings) -> Result<()> {
    let registry = load_registry(tasks, settings)?;
    let task = registry
        .get(name)
        .ok_or_else(|| Error::config(format!("unknown task '{}'", name)))?;

    let mut schemas = vec![task.tool_schema()];
    schemas.extend(task.tasks.values().map(|child| child.tool_schema()));
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

/// Reads a YAML list of scripted replies
pub fn load_replies(path: &Path) -> Result<Vec<Option<ScriptedReply>>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn parse_inputs(inputs: Option<&str>) -> Result<Map<String, Value>> {
    match inputs {
        None => Ok(Map::new()),
        Some(raw) => match serde_json::from_str(raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::config("inputs must be a JSON object")),
        },
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::TaskStarted { task_name, task_id } => {
            format!("{} {} ({})", "▶".cyan(), task_name.bold(), task_id)
        }
        Event::TaskFinished {
            task_name,
            status,
            result_code,
            ..
        } => {
            let status = match status {
                crate::core::TaskStatus::Complete => status.to_string().green(),
                _ => status.to_string().red(),
            };
            format!("{} {} {} [{}]", "■".cyan(), task_name.bold(), status, result_code)
        }
        Event::NewMessage { task_name, message } => {
            format!("  {} {}: {}", task_name.dimmed(), message.role.blue(), message.content)
        }
        Event::ToolInvoked {
            executor,
            tool,
            success,
        } => {
            let outcome = if *success { "ok".green() } else { "error".red() };
            format!("  {} ran {} ({})", executor, tool.yellow(), outcome)
        }
        Event::CodeExecuted {
            language,
            exit_code,
        } => format!("  {} code exited with {}", language.yellow(), exit_code),
    }
}

async fn run(
    tasks: &Path,
    name: &str,
    inputs: Option<&str>,
    replies: Option<&Path>,
    settings: &Settings,
) -> Result<()> {
    let registry = load_registry(tasks, settings)?;
    let task = registry
        .get(name)
        .ok_or_else(|| Error::config(format!("unknown task '{}'", name)))?;
    let inputs = parse_inputs(inputs)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runtime = Runtime::from_settings(settings)?.with_events(tx);
    match replies {
        Some(path) => {
            let agent = ReplayAgent::new("replay", load_replies(path)?);
            runtime = runtime.with_default_agent(Arc::new(agent));
        }
        None => warn!("No replies given, tasks needing an agent will fail"),
    }

    let report = task.deep_validate_required_apis(runtime.apis.as_ref());
    for warning in &report.warnings {
        warn!(
            "Task '{}' requires unavailable API '{}': {}",
            warning.task_name, warning.api, warning.reason
        );
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("{}", describe(&event));
        }
    });

    let response = task.execute(&runtime, inputs, &ExecutionHistory::new()).await;
    drop(runtime);
    if let Err(e) = printer.await {
        warn!("Event printer stopped: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_complete() {
        return Err(Error::config(format!(
            "task '{}' ended with {} ({})",
            response.task_name, response.result_code, response.result_label
        )));
    }
    Ok(())
}
