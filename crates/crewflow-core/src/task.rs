//! The task aggregate and its append-only submission ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::SubmissionPayload;
use crate::role::RoleType;

/// States a task can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    InProgress,
    /// Waiting for human input (analyst questions).
    Paused,
    /// Offering a design rebound after repeated failures.
    ReboundOffered,
    Complete,
    Escalated,
    Aborted,
}

impl TaskState {
    /// Whether the task has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Complete | TaskState::Escalated | TaskState::Aborted
        )
    }

    /// Whether the task is waiting on external resume input.
    pub fn is_suspended(&self) -> bool {
        matches!(self, TaskState::Paused | TaskState::ReboundOffered)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::NotStarted => "not_started",
            TaskState::InProgress => "in_progress",
            TaskState::Paused => "paused",
            TaskState::ReboundOffered => "rebound_offered",
            TaskState::Complete => "complete",
            TaskState::Escalated => "escalated",
            TaskState::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Outcome tag attached to a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Confirmed,
    Submitted,
    Approved,
    Rejected,
    Paused,
    Resumed,
    Aborted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Confirmed => "confirmed",
            Outcome::Submitted => "submitted",
            Outcome::Approved => "approved",
            Outcome::Rejected => "rejected",
            Outcome::Paused => "paused",
            Outcome::Resumed => "resumed",
            Outcome::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// One immutable entry in a task's submission ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Role name that produced the entry.
    pub role: String,
    /// Role type the entry was recorded under.
    pub kind: RoleType,
    /// Iteration the task was on when the entry was recorded.
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub data: SubmissionPayload,
    pub outcome: Option<Outcome>,
}

/// The mutable aggregate root for one workflow run.
///
/// `submissions` is the single source of truth for history; entries are
/// never removed or rewritten, even when a later step fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Timestamp + slug identifier, unique in practice.
    pub id: String,
    pub description: String,
    pub state: TaskState,
    pub current_role: String,
    /// 0-based offset into the workflow sequence.
    pub current_role_index: usize,
    /// Starts at 1; bumped on each gatekeeper rejection.
    pub iteration: u32,
    pub confirmed_requirements: Option<String>,
    pub current_design: Option<String>,
    pub user_answers: Option<String>,
    pub submissions: Vec<Submission>,
    /// Consecutive gatekeeper rejections since the last reset.
    pub coder_failures: u32,
    /// Most recent rejection verdict, if any.
    pub last_rejection: Option<SubmissionPayload>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a fresh in-progress task pointed at the first workflow role.
    pub fn new(description: impl Into<String>, first_role: &str, now: DateTime<Utc>) -> Self {
        let description = description.into();
        Self {
            id: generate_task_id(&description, now),
            description,
            state: TaskState::InProgress,
            current_role: first_role.to_string(),
            current_role_index: 0,
            iteration: 1,
            confirmed_requirements: None,
            current_design: None,
            user_answers: None,
            submissions: Vec::new(),
            coder_failures: 0,
            last_rejection: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Append an entry to the submission ledger at the current iteration.
    pub fn record(
        &mut self,
        role: &str,
        kind: RoleType,
        data: SubmissionPayload,
        outcome: Option<Outcome>,
        now: DateTime<Utc>,
    ) {
        self.submissions.push(Submission {
            role: role.to_string(),
            kind,
            iteration: self.iteration,
            timestamp: now,
            data,
            outcome,
        });
    }

    /// De-duplicated union of `files_changed` across all implementer
    /// submissions, in first-seen order.
    pub fn files_changed(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for sub in &self.submissions {
            for file in sub.data.files_changed() {
                if !files.iter().any(|f| f == file) {
                    files.push(file.clone());
                }
            }
        }
        files
    }

    /// Reasons from every gatekeeper rejection recorded so far, in order.
    pub fn rejection_reasons(&self) -> Vec<String> {
        self.submissions
            .iter()
            .filter(|s| s.data.is_rejection())
            .map(|s| s.data.reason().unwrap_or_default().to_string())
            .collect()
    }

    /// "Iteration N: reason" lines for every rejection, for the designer's
    /// failure context on a rebound.
    pub fn failure_context(&self) -> String {
        self.submissions
            .iter()
            .filter(|s| s.data.is_rejection())
            .map(|s| {
                format!(
                    "Iteration {}: {}",
                    s.iteration,
                    s.data.reason().unwrap_or("No reason given")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Generate a task id from the timestamp and a slug of the description.
fn generate_task_id(description: &str, now: DateTime<Utc>) -> String {
    let timestamp = now.format("%Y-%m-%d_%H%M%S");
    let mut slug = String::with_capacity(description.len());
    let mut last_dash = true;
    for c in description.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 50 {
            break;
        }
    }
    let slug = slug.trim_matches('-');
    format!("{timestamp}_{slug}")
}
