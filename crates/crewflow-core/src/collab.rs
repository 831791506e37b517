//! Collaborator seams: agent resolution, version control, artifact output.
//!
//! The state machine consumes these as traits so hosts can swap in their
//! own implementations; `StaticAgentProvider` is the in-memory provider
//! used by tests and embedders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};
use crate::outcome::TaskComplete;
use crate::role::{RoleType, WorkflowSpec};
use crate::task::{Submission, Task};

/// A resolved agent: its declared role type and system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    /// Declared role type; overrides the workflow entry's type.
    pub kind: RoleType,
    /// System prompt for the role.
    pub instructions: String,
}

/// Resolves a role name to its prompt and declared type.
pub trait AgentProvider {
    /// # Errors
    ///
    /// Returns `WorkflowError::AgentNotFound` when the role cannot be
    /// resolved.
    fn resolve(&self, role: &str) -> WorkflowResult<AgentProfile>;

    /// Context file list for a role. Defaults to none.
    fn context_files(&self, _role: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Branch creation and commit-on-submit.
///
/// Failures are reported as `false` and logged by implementations; the
/// workflow never blocks on version control.
pub trait VersionControl {
    fn start_run(&mut self, task_id: &str) -> bool;
    fn commit(&mut self, role: &str, summary: &str, files: &[String]) -> bool;
    fn complete_run(&mut self) -> bool;
    fn branch_name(&self) -> Option<String>;
}

/// Renders submissions and summaries to persisted documents.
///
/// Fire-and-forget: the workflow consumes no return value and must not
/// fail because an artifact could not be written.
pub trait ArtifactSink {
    /// Called once when a task starts.
    fn on_start(&mut self, _task: &Task) {}
    fn on_submission(&mut self, task: &Task, submission: &Submission);
    fn on_complete(&mut self, task: &Task, result: &TaskComplete);
}

/// In-memory agent provider backed by a name -> profile map.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentProvider {
    agents: HashMap<String, AgentProfile>,
}

impl StaticAgentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, builder-style.
    pub fn with_agent(
        mut self,
        name: impl Into<String>,
        kind: RoleType,
        instructions: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.agents.insert(
            name.clone(),
            AgentProfile {
                name,
                kind,
                instructions: instructions.into(),
            },
        );
        self
    }

    /// One placeholder agent per workflow role, typed as the spec declares.
    pub fn for_spec(spec: &WorkflowSpec) -> Self {
        let mut provider = Self::new();
        for entry in &spec.sequence {
            provider = provider.with_agent(
                &entry.role,
                entry.kind,
                format!("You are the {} role ({}).", entry.role, entry.kind),
            );
        }
        provider
    }
}

impl AgentProvider for StaticAgentProvider {
    fn resolve(&self, role: &str) -> WorkflowResult<AgentProfile> {
        self.agents
            .get(role)
            .cloned()
            .ok_or_else(|| WorkflowError::AgentNotFound {
                role: role.to_string(),
            })
    }
}
