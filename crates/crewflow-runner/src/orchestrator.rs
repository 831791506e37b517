//! Side-effect wiring around the core session.
//!
//! The orchestrator owns a `WorkflowSession` plus the version control and
//! artifact collaborators, and runs the side-effect protocol around every
//! state transition: branch on start, artifact per ledger entry, commit
//! after implementer submissions, branch injection and summary on
//! completion. Collaborator failures are logged, never propagated.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crewflow_core::{
    ArtifactSink, RoleAssignment, Submission, SubmissionPayload, SubmitOutcome, TaskStatus,
    VersionControl, WorkflowSession,
};

use crate::agents::FsAgentProvider;
use crate::artifacts::RunArtifacts;
use crate::config::CrewConfig;
use crate::error::RunnerResult;
use crate::git::GitWorkspace;

pub struct Orchestrator {
    session: WorkflowSession,
    vcs: Box<dyn VersionControl>,
    artifacts: Box<dyn ArtifactSink>,
}

impl Orchestrator {
    pub fn new(
        session: WorkflowSession,
        vcs: Box<dyn VersionControl>,
        artifacts: Box<dyn ArtifactSink>,
    ) -> Self {
        Self {
            session,
            vcs,
            artifacts,
        }
    }

    /// Wire up the default collaborators for a workspace.
    pub fn from_config(config: CrewConfig, workspace_root: &Path) -> RunnerResult<Self> {
        let provider = Arc::new(FsAgentProvider::with_standard_dirs(
            config.clone(),
            workspace_root,
        ));
        let session = WorkflowSession::new(config.workflow.clone(), provider)?
            .with_rules(config.rules.clone())
            .with_runs_dir(config.output.runs_dir.clone());
        Ok(Self {
            session,
            vcs: Box::new(GitWorkspace::new(config.git, workspace_root)),
            artifacts: Box::new(RunArtifacts::with_root(config.output, workspace_root)),
        })
    }

    pub fn session(&self) -> &WorkflowSession {
        &self.session
    }

    pub fn start_task(&mut self, description: &str) -> RunnerResult<RoleAssignment> {
        let assignment = self.session.start_task(description)?;
        if let Some(task) = self.session.task() {
            if !self.vcs.start_run(&task.id) {
                warn!(task_id = %task.id, "version control could not start the run");
            }
            self.artifacts.on_start(task);
        }
        Ok(assignment)
    }

    pub fn submit(&mut self, payload: SubmissionPayload) -> RunnerResult<SubmitOutcome> {
        // Captured before the payload moves into the session; the commit
        // happens only after the submission is accepted.
        let commit_info = match &payload {
            SubmissionPayload::Implementation {
                summary,
                files_changed,
                ..
            } => Some((summary.clone(), files_changed.clone())),
            _ => None,
        };

        let mut outcome = self.session.submit(payload)?;
        self.record_last_submission();

        if let Some((summary, files)) = commit_info {
            let role = self
                .session
                .task()
                .and_then(|t| t.submissions.last())
                .map_or_else(|| "implementer".to_string(), |s| s.role.clone());
            if !self.vcs.commit(&role, &summary, &files) {
                warn!(role = %role, "version control commit failed");
            }
        }

        self.finalize(&mut outcome);
        Ok(outcome)
    }

    pub fn resume(&mut self, input: &str) -> RunnerResult<SubmitOutcome> {
        let mut outcome = self.session.resume(input)?;
        self.record_last_submission();
        self.finalize(&mut outcome);
        Ok(outcome)
    }

    pub fn status(&self) -> TaskStatus {
        self.session.status()
    }

    pub fn history(&self, role: Option<&str>, iteration: Option<u32>) -> Vec<Submission> {
        self.session.history(role, iteration)
    }

    pub fn abort(&mut self, reason: Option<&str>) {
        self.session.abort(reason);
        self.record_last_submission();
    }

    /// Write the artifact for the ledger entry the last operation appended.
    fn record_last_submission(&mut self) {
        if let Some(task) = self.session.task() {
            if let Some(last) = task.submissions.last() {
                self.artifacts.on_submission(task, last);
            }
        }
    }

    /// On completion: final commit, branch injection, summary artifact.
    fn finalize(&mut self, outcome: &mut SubmitOutcome) {
        if let SubmitOutcome::Complete(result) = outcome {
            if !self.vcs.complete_run() {
                warn!("version control could not complete the run");
            }
            result.branch = self.vcs.branch_name();
            if let Some(task) = self.session.task() {
                self.artifacts.on_complete(task, result);
            }
        }
    }
}
