//! Error taxonomy for the workflow state machine.

use crate::role::RoleType;
use crate::task::TaskState;

/// Errors produced by the workflow state machine.
///
/// All failures are surfaced to the caller as typed values and none are
/// retried internally — retry policy belongs to whoever drives the workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("no active task")]
    NoActiveTask,

    #[error("task is suspended ({state}); resume it before submitting")]
    TaskSuspended { state: TaskState },

    #[error("{kind} submission missing required field: {field}")]
    MissingField { kind: RoleType, field: &'static str },

    #[error("current role expects a {expected} submission, got {got}")]
    PayloadMismatch {
        expected: RoleType,
        got: &'static str,
    },

    #[error("unknown role type: {0}")]
    UnknownRoleType(String),

    #[error("workflow sequence has no {kind} role")]
    MissingRoleInWorkflow { kind: RoleType },

    #[error("cannot resume task in state {state}")]
    InvalidResumeState { state: TaskState },

    #[error("agent not found for role: {role}")]
    AgentNotFound { role: String },

    #[error("invalid workflow spec: {0}")]
    InvalidSpec(String),
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
