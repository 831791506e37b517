//! Results returned by `submit` and `resume`, plus the status projection.
//!
//! `SubmitOutcome` is a closed sum type so callers must handle every way a
//! submission can land — there is no "unknown result" fallthrough.

use serde::{Deserialize, Serialize};

use crate::assignment::RoleAssignment;
use crate::task::{Submission, TaskState};

/// Fixed suggestion attached to a rebound offer.
pub const REBOUND_SUGGESTION: &str = "Consider consulting the designer to revisit the approach";

/// Everything a submission or resume can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Normal flow: the next role's work order.
    Assignment(RoleAssignment),
    /// Analyst questions need human answers.
    Paused(TaskPaused),
    /// The sequence finished.
    Complete(TaskComplete),
    /// Repeated failures; offering to route back to the designer.
    ReboundOffer(TaskReboundOffer),
    /// Iteration budget exhausted.
    Escalated(TaskEscalate),
}

/// Returned when the analyst needs human input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPaused {
    /// Which role paused.
    pub role: String,
    pub questions: Vec<String>,
    /// What the analyst understood so far.
    pub context: String,
    pub partial_spec: Option<String>,
}

/// Returned when the final role in the sequence signs off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskComplete {
    pub success: bool,
    pub summary: String,
    pub iterations: u32,
    pub files_changed: Vec<String>,
    pub requirements: Option<String>,
    pub design: Option<String>,
    /// Working branch, when version control ran in branch mode.
    pub branch: Option<String>,
    /// Where the run's artifacts live.
    pub run_path: String,
}

/// Returned when repeated failures suggest a design problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReboundOffer {
    /// Consecutive failures in this streak.
    pub failures: u32,
    /// Most recent rejection reason.
    pub last_rejection: String,
    /// Detected pattern across the rejection reasons, if any.
    pub pattern: Option<String>,
    pub suggestion: String,
}

/// Returned when the iteration budget runs out without resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEscalate {
    pub reason: String,
    pub iterations: u32,
    /// Why the work kept failing.
    pub last_feedback: String,
    pub suggestion: String,
}

/// Read-only projection of the current task.
///
/// Valid even with no active task: `state` is `NotStarted` and everything
/// else is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Original task description; empty when nothing has started.
    pub task: String,
    pub state: TaskState,
    pub current_role: Option<String>,
    pub iteration: u32,
    pub history: Vec<Submission>,
    pub confirmed_requirements: Option<String>,
    pub current_design: Option<String>,
}

impl TaskStatus {
    /// The projection reported before any task has started.
    pub fn not_started() -> Self {
        Self {
            task: String::new(),
            state: TaskState::NotStarted,
            current_role: None,
            iteration: 0,
            history: Vec::new(),
            confirmed_requirements: None,
            current_design: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started_status_is_empty() {
        let status = TaskStatus::not_started();
        assert_eq!(status.state, TaskState::NotStarted);
        assert!(status.task.is_empty());
        assert!(status.history.is_empty());
        assert_eq!(status.iteration, 0);
    }

    #[test]
    fn test_submit_outcome_serde_is_tagged() {
        let outcome = SubmitOutcome::Escalated(TaskEscalate {
            reason: "budget exhausted".into(),
            iterations: 6,
            last_feedback: "still failing".into(),
            suggestion: "simplify the task".into(),
        });
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"type\":\"escalated\""));
        let back: SubmitOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
    }
}
