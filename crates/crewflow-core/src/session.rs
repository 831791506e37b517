//! The workflow state machine: role sequencing, submission dispatch,
//! rejection / rebound / escalation policy, and the pause/resume protocol.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::assignment::{Briefing, RoleAssignment};
use crate::collab::{AgentProfile, AgentProvider};
use crate::error::{WorkflowError, WorkflowResult};
use crate::outcome::{
    SubmitOutcome, TaskComplete, TaskEscalate, TaskPaused, TaskReboundOffer, TaskStatus,
    REBOUND_SUGGESTION,
};
use crate::pattern::detect_failure_pattern;
use crate::payload::SubmissionPayload;
use crate::role::{OnMaxIterations, RoleType, WorkflowSpec};
use crate::task::{Outcome, Task, TaskState};

const DEFAULT_RUNS_DIR: &str = ".crew/runs";

/// One review-workflow session.
///
/// Owns at most one active [`Task`] and every transition it can make.
/// Operations are synchronous request/response: each runs to completion
/// before the next, and `&mut self` on mutating operations makes the
/// single-caller assumption a compile-time contract. Hosts exposing a
/// session to multiple clients must guard it behind one mutual-exclusion
/// boundary, since task mutation is not safe for concurrent access.
pub struct WorkflowSession {
    spec: WorkflowSpec,
    provider: Arc<dyn AgentProvider>,
    rules: Vec<String>,
    runs_dir: String,
    /// Agents resolved for the current task, keyed by role name.
    agents: HashMap<String, AgentProfile>,
    task: Option<Task>,
}

impl WorkflowSession {
    /// Create a session over a validated workflow spec.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidSpec` when the spec fails validation.
    pub fn new(spec: WorkflowSpec, provider: Arc<dyn AgentProvider>) -> WorkflowResult<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            provider,
            rules: Vec::new(),
            runs_dir: DEFAULT_RUNS_DIR.to_string(),
            agents: HashMap::new(),
            task: None,
        })
    }

    /// Global rules attached to every role assignment.
    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules = rules;
        self
    }

    /// Where completed runs report their artifact path.
    pub fn with_runs_dir(mut self, runs_dir: impl Into<String>) -> Self {
        self.runs_dir = runs_dir.into();
        self
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    /// The current task, if one has been started.
    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Start a new task and assign the first role in the sequence.
    ///
    /// Resolves every agent in the workflow up front, so a broken sequence
    /// fails here instead of mid-run. If a task is already active it is
    /// silently replaced — callers wanting confirmation must ask before
    /// calling.
    pub fn start_task(&mut self, description: &str) -> WorkflowResult<RoleAssignment> {
        let mut agents = HashMap::new();
        for entry in &self.spec.sequence {
            agents.insert(entry.role.clone(), self.provider.resolve(&entry.role)?);
        }
        self.agents = agents;

        if let Some(old) = &self.task {
            if !old.state.is_terminal() {
                warn!(task_id = %old.id, state = %old.state, "replacing active task");
            }
        }

        let first_role = self.spec.sequence[0].role.clone();
        let task = Task::new(description, &first_role, Utc::now());
        info!(task_id = %task.id, role = %first_role, "task started");
        self.task = Some(task);

        self.make_assignment(0, None, None)
    }

    /// Submit work for the current role.
    ///
    /// Dispatches on the current workflow role's declared type; the payload
    /// variant must satisfy that type's contract.
    pub fn submit(&mut self, payload: SubmissionPayload) -> WorkflowResult<SubmitOutcome> {
        let (state, index) = {
            let task = self.task.as_ref().ok_or(WorkflowError::NoActiveTask)?;
            (task.state, task.current_role_index)
        };
        match state {
            TaskState::InProgress => {}
            s if s.is_suspended() => return Err(WorkflowError::TaskSuspended { state: s }),
            _ => return Err(WorkflowError::NoActiveTask),
        }
        payload.validate()?;

        match self.kind_at(index) {
            RoleType::Analyst => self.handle_analyst(payload),
            RoleType::Designer => self.handle_designer(payload),
            RoleType::Implementer => self.handle_implementer(payload),
            RoleType::Gatekeeper => self.handle_gatekeeper(payload),
        }
    }

    /// Resume a paused or rebound-offered task with human input.
    pub fn resume(&mut self, input: &str) -> WorkflowResult<SubmitOutcome> {
        let state = self.task.as_ref().ok_or(WorkflowError::NoActiveTask)?.state;
        match state {
            TaskState::Paused => {
                {
                    let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                    task.user_answers = Some(input.to_string());
                    task.state = TaskState::InProgress;
                    let role = task.current_role.clone();
                    task.record(
                        &role,
                        RoleType::Analyst,
                        SubmissionPayload::UserAnswers {
                            answers: input.to_string(),
                        },
                        Some(Outcome::Resumed),
                        Utc::now(),
                    );
                    info!(task_id = %task.id, "task resumed with user answers");
                }
                self.advance(None)
            }
            TaskState::ReboundOffered => self.resolve_rebound(input),
            other => Err(WorkflowError::InvalidResumeState { state: other }),
        }
    }

    /// Read-only projection of the current task; `NotStarted` when none.
    pub fn status(&self) -> TaskStatus {
        match &self.task {
            None => TaskStatus::not_started(),
            Some(task) => TaskStatus {
                task: task.description.clone(),
                state: task.state,
                current_role: Some(task.current_role.clone()),
                iteration: task.iteration,
                history: task.submissions.clone(),
                confirmed_requirements: task.confirmed_requirements.clone(),
                current_design: task.current_design.clone(),
            },
        }
    }

    /// The submission ledger, optionally filtered by exact role name and/or
    /// iteration. Empty when no task is active.
    pub fn history(&self, role: Option<&str>, iteration: Option<u32>) -> Vec<crate::task::Submission> {
        let Some(task) = &self.task else {
            return Vec::new();
        };
        task.submissions
            .iter()
            .filter(|s| role.map_or(true, |r| s.role == r))
            .filter(|s| iteration.map_or(true, |i| s.iteration == i))
            .cloned()
            .collect()
    }

    /// Abort the current task, appending a synthetic ledger entry.
    /// No-op when no task is active.
    pub fn abort(&mut self, reason: Option<&str>) {
        if let Some(task) = self.task.as_mut() {
            task.state = TaskState::Aborted;
            let role = task.current_role.clone();
            task.record(
                &role,
                RoleType::Implementer,
                SubmissionPayload::Aborted {
                    reason: reason.unwrap_or("Aborted by user").to_string(),
                },
                Some(Outcome::Aborted),
                Utc::now(),
            );
            info!(task_id = %task.id, "task aborted");
        }
    }

    // ---- dispatch -------------------------------------------------------

    fn handle_analyst(&mut self, payload: SubmissionPayload) -> WorkflowResult<SubmitOutcome> {
        match payload {
            SubmissionPayload::Questions {
                ref questions,
                ref context,
                ref partial_spec,
            } => {
                let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                let paused = TaskPaused {
                    role: task.current_role.clone(),
                    questions: questions.clone(),
                    context: context.clone(),
                    partial_spec: partial_spec.clone(),
                };
                task.state = TaskState::Paused;
                let role = task.current_role.clone();
                task.record(
                    &role,
                    RoleType::Analyst,
                    payload.clone(),
                    Some(Outcome::Paused),
                    Utc::now(),
                );
                info!(task_id = %task.id, "task paused on analyst questions");
                Ok(SubmitOutcome::Paused(paused))
            }
            SubmissionPayload::Requirements {
                ref confirmed_requirements,
            } => {
                {
                    let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                    task.confirmed_requirements = Some(confirmed_requirements.clone());
                    let role = task.current_role.clone();
                    task.record(
                        &role,
                        RoleType::Analyst,
                        payload.clone(),
                        Some(Outcome::Confirmed),
                        Utc::now(),
                    );
                }
                self.advance(None)
            }
            other => Err(WorkflowError::PayloadMismatch {
                expected: RoleType::Analyst,
                got: other.tag(),
            }),
        }
    }

    fn handle_designer(&mut self, payload: SubmissionPayload) -> WorkflowResult<SubmitOutcome> {
        match payload {
            SubmissionPayload::Design { ref design, .. } => {
                {
                    let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                    task.current_design = Some(design.clone());
                    let role = task.current_role.clone();
                    task.record(
                        &role,
                        RoleType::Designer,
                        payload.clone(),
                        Some(Outcome::Submitted),
                        Utc::now(),
                    );
                }
                self.advance(None)
            }
            other => Err(WorkflowError::PayloadMismatch {
                expected: RoleType::Designer,
                got: other.tag(),
            }),
        }
    }

    fn handle_implementer(&mut self, payload: SubmissionPayload) -> WorkflowResult<SubmitOutcome> {
        match payload {
            SubmissionPayload::Implementation { .. } => {
                {
                    let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                    let role = task.current_role.clone();
                    task.record(
                        &role,
                        RoleType::Implementer,
                        payload.clone(),
                        Some(Outcome::Submitted),
                        Utc::now(),
                    );
                }
                // Forward the work to the next role as its review target.
                self.advance(Some(payload))
            }
            other => Err(WorkflowError::PayloadMismatch {
                expected: RoleType::Implementer,
                got: other.tag(),
            }),
        }
    }

    fn handle_gatekeeper(&mut self, payload: SubmissionPayload) -> WorkflowResult<SubmitOutcome> {
        match payload {
            SubmissionPayload::Verdict { approved, .. } => {
                {
                    let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                    let role = task.current_role.clone();
                    let outcome = if approved {
                        Outcome::Approved
                    } else {
                        Outcome::Rejected
                    };
                    task.record(
                        &role,
                        RoleType::Gatekeeper,
                        payload.clone(),
                        Some(outcome),
                        Utc::now(),
                    );
                }
                if approved {
                    // An approval ends the failure streak.
                    if let Some(task) = self.task.as_mut() {
                        task.coder_failures = 0;
                    }
                    self.advance(None)
                } else {
                    self.handle_rejection(payload)
                }
            }
            other => Err(WorkflowError::PayloadMismatch {
                expected: RoleType::Gatekeeper,
                got: other.tag(),
            }),
        }
    }

    // ---- sequencing and policy ------------------------------------------

    /// Move to the next role, or complete the task at the end of the
    /// sequence.
    fn advance(&mut self, reviewing: Option<SubmissionPayload>) -> WorkflowResult<SubmitOutcome> {
        let last_index = self.spec.sequence.len() - 1;
        let next_index;
        {
            let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
            if task.current_role_index >= last_index {
                task.state = TaskState::Complete;
                task.completed_at = Some(Utc::now());
                let result = TaskComplete {
                    success: true,
                    summary: format!("Completed: {}", task.description),
                    iterations: task.iteration,
                    files_changed: task.files_changed(),
                    requirements: task.confirmed_requirements.clone(),
                    design: task.current_design.clone(),
                    branch: None,
                    run_path: format!("{}/{}", self.runs_dir, task.id),
                };
                info!(task_id = %task.id, iterations = task.iteration, "task complete");
                return Ok(SubmitOutcome::Complete(result));
            }
            task.current_role_index += 1;
            next_index = task.current_role_index;
            task.current_role = self.spec.sequence[next_index].role.clone();
        }
        let assignment = self.make_assignment(next_index, reviewing, None)?;
        Ok(SubmitOutcome::Assignment(assignment))
    }

    /// Apply the rejection policy: count the failure, then offer a rebound,
    /// escalate, or loop back to the implementer.
    fn handle_rejection(&mut self, rejection: SubmissionPayload) -> WorkflowResult<SubmitOutcome> {
        let rebound_after = self.spec.rebound_after_failures;
        let max_iterations = self.spec.max_iterations;
        let on_max = self.spec.on_max_iterations;
        {
            let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
            task.iteration += 1;
            task.coder_failures += 1;
            task.last_rejection = Some(rejection.clone());

            // One-shot trigger: exact equality, not a threshold. A counter
            // that skips past the value must not re-trigger in the streak.
            if task.coder_failures == rebound_after {
                task.state = TaskState::ReboundOffered;
                let reasons = task.rejection_reasons();
                warn!(
                    task_id = %task.id,
                    failures = task.coder_failures,
                    "offering design rebound"
                );
                return Ok(SubmitOutcome::ReboundOffer(TaskReboundOffer {
                    failures: task.coder_failures,
                    last_rejection: rejection
                        .reason()
                        .unwrap_or("No reason provided")
                        .to_string(),
                    pattern: detect_failure_pattern(&reasons),
                    suggestion: REBOUND_SUGGESTION.to_string(),
                }));
            }

            if task.iteration > max_iterations {
                task.state = TaskState::Escalated;
                let (reason, suggestion) = match on_max {
                    OnMaxIterations::Escalate => (
                        "Maximum iterations reached without resolution",
                        "Consider simplifying the task or manually reviewing the implementation",
                    ),
                    OnMaxIterations::Fail => (
                        "Maximum iterations reached; task failed",
                        "Restart with a smaller scope",
                    ),
                };
                warn!(task_id = %task.id, iterations = task.iteration, "task escalated");
                return Ok(SubmitOutcome::Escalated(TaskEscalate {
                    reason: reason.to_string(),
                    iterations: task.iteration,
                    last_feedback: rejection.reason().unwrap_or_default().to_string(),
                    suggestion: suggestion.to_string(),
                }));
            }
        }

        let index = self.find_kind(RoleType::Implementer).ok_or(
            WorkflowError::MissingRoleInWorkflow {
                kind: RoleType::Implementer,
            },
        )?;
        self.point_at(index)?;
        let assignment = self.make_assignment(index, None, Some(compose_feedback(&rejection)))?;
        Ok(SubmitOutcome::Assignment(assignment))
    }

    /// Settle a rebound offer from human input.
    fn resolve_rebound(&mut self, input: &str) -> WorkflowResult<SubmitOutcome> {
        let affirmative = matches!(input.trim().to_lowercase().as_str(), "yes" | "y");
        if affirmative {
            let index = self.find_kind(RoleType::Designer).ok_or(
                WorkflowError::MissingRoleInWorkflow {
                    kind: RoleType::Designer,
                },
            )?;
            {
                let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                task.coder_failures = 0;
                task.state = TaskState::InProgress;
                info!(task_id = %task.id, "rebound accepted; routing to designer");
            }
            self.point_at(index)?;
            let assignment = self.make_assignment(index, None, None)?;
            Ok(SubmitOutcome::Assignment(assignment))
        } else {
            let index = self.find_kind(RoleType::Implementer).ok_or(
                WorkflowError::MissingRoleInWorkflow {
                    kind: RoleType::Implementer,
                },
            )?;
            let feedback = {
                let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
                task.state = TaskState::InProgress;
                info!(task_id = %task.id, "rebound declined; returning to implementer");
                task.last_rejection
                    .as_ref()
                    .and_then(|r| r.reason())
                    .unwrap_or_default()
                    .to_string()
            };
            self.point_at(index)?;
            let assignment = self.make_assignment(index, None, Some(feedback))?;
            Ok(SubmitOutcome::Assignment(assignment))
        }
    }

    // ---- helpers --------------------------------------------------------

    /// Effective role type at a sequence index: the resolved agent's
    /// declared type wins, the workflow entry's type is the fallback.
    fn kind_at(&self, index: usize) -> RoleType {
        let entry = &self.spec.sequence[index];
        self.agents
            .get(&entry.role)
            .map_or(entry.kind, |profile| profile.kind)
    }

    /// First sequence index whose effective type matches `kind`.
    fn find_kind(&self, kind: RoleType) -> Option<usize> {
        (0..self.spec.sequence.len()).find(|&i| self.kind_at(i) == kind)
    }

    /// Point the task at a sequence index.
    fn point_at(&mut self, index: usize) -> WorkflowResult<()> {
        let role = self.spec.sequence[index].role.clone();
        let task = self.task.as_mut().ok_or(WorkflowError::NoActiveTask)?;
        task.current_role_index = index;
        task.current_role = role;
        Ok(())
    }

    /// Build the assignment for the role at `index` — a pure projection
    /// over current task state.
    fn make_assignment(
        &self,
        index: usize,
        reviewing: Option<SubmissionPayload>,
        feedback: Option<String>,
    ) -> WorkflowResult<RoleAssignment> {
        let task = self.task.as_ref().ok_or(WorkflowError::NoActiveTask)?;
        let entry = &self.spec.sequence[index];
        let profile =
            self.agents
                .get(&entry.role)
                .ok_or_else(|| WorkflowError::AgentNotFound {
                    role: entry.role.clone(),
                })?;

        let briefing = match profile.kind {
            RoleType::Analyst => Briefing::Analysis {
                task: task.description.clone(),
            },
            RoleType::Designer => Briefing::Design {
                task: task.description.clone(),
                requirements: task.confirmed_requirements.clone(),
                failure_context: task
                    .last_rejection
                    .as_ref()
                    .map(|_| task.failure_context()),
            },
            RoleType::Implementer => Briefing::Implementation {
                task: task.description.clone(),
                requirements: task.confirmed_requirements.clone(),
                design: task.current_design.clone(),
                feedback,
            },
            RoleType::Gatekeeper => Briefing::Review {
                reviewing,
                requirements: task.confirmed_requirements.clone(),
                design: task.current_design.clone(),
            },
        };

        Ok(RoleAssignment {
            role: entry.role.clone(),
            kind: profile.kind,
            iteration: task.iteration,
            instructions: profile.instructions.clone(),
            rules: self.rules.clone(),
            context: self.provider.context_files(&entry.role),
            briefing,
        })
    }
}

/// Rejection reason plus a bulleted issue list, for the implementer retry.
fn compose_feedback(rejection: &SubmissionPayload) -> String {
    let issues = rejection
        .issues()
        .iter()
        .map(|issue| format!("- {issue}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nIssues:\n{}",
        rejection.reason().unwrap_or_default(),
        issues
    )
}
