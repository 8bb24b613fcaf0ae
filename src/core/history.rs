use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Record of one task invocation in a call chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    pub task_name: String,
    pub task_id: String,
    pub task_description: String,
}

/// Ordered invocation records of one logical call chain.
///
/// Entries are only ever appended. A name index sits next to the list so
/// the recursion guard does not scan the chain on every call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    entries: Vec<ExecutionHistoryEntry>,
    names: HashSet<String>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from previously recorded entries
    pub fn from_entries(entries: Vec<ExecutionHistoryEntry>) -> Self {
        let names = entries.iter().map(|e| e.task_name.clone()).collect();
        ExecutionHistory { entries, names }
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.names.contains(task_name)
    }

    pub fn push(&mut self, entry: ExecutionHistoryEntry) {
        self.names.insert(entry.task_name.clone());
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ExecutionHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
