use crate::agents::{Agent, AgentRoster};
use crate::config::Settings;
use crate::errors::Result;
use crate::event::Event;
use crate::modules::{ApiRegistry, CodeSandbox, LocalSandbox, StaticApiRegistry};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// External collaborators a task run may reach
#[derive(Debug, Clone)]
pub struct Runtime {
    pub agents: AgentRoster,
    pub sandbox: Arc<dyn CodeSandbox>,
    pub apis: Arc<dyn ApiRegistry>,
    /// Optional sink for progress events
    pub events: Option<UnboundedSender<Event>>,
}

impl Runtime {
    pub fn new(apis: Arc<dyn ApiRegistry>, sandbox: Arc<dyn CodeSandbox>) -> Self {
        Runtime {
            agents: AgentRoster::new(),
            sandbox,
            apis,
            events: None,
        }
    }

    /// Builds a runtime from engine settings: static API table and local sandbox
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = match &settings.sandbox.timeout {
            Some(value) => crate::config::parse_duration(value)?,
            None => LocalSandbox::default().timeout,
        };
        let sandbox = LocalSandbox::new(timeout, settings.sandbox.work_dir.clone());
        let apis = StaticApiRegistry::new(settings.apis.clone());
        Ok(Self::new(Arc::new(apis), Arc::new(sandbox)))
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(agent);
        self
    }

    pub fn with_default_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.set_default(agent);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sends an event when a sink is attached; a closed sink is ignored
    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}
