//! Role assignments — the work order handed to whichever role is next.

use serde::{Deserialize, Serialize};

use crate::payload::SubmissionPayload;
use crate::role::RoleType;

/// Instructs a role what to do next.
///
/// A pure projection over the current task state: identity, iteration,
/// resolved instructions and context, plus a role-type-specific briefing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Role name, e.g. "ba", "architect", "coder", "qa".
    pub role: String,
    pub kind: RoleType,
    pub iteration: u32,
    /// System prompt resolved from the agent provider.
    pub instructions: String,
    /// Global rules that apply to every role.
    pub rules: Vec<String>,
    /// Resolved context file list for this role.
    pub context: Vec<String>,
    /// Role-type-specific working material.
    pub briefing: Briefing,
}

/// The role-type-specific portion of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Briefing {
    /// Analyst: the task to clarify.
    Analysis { task: String },
    /// Designer: confirmed requirements, plus what went wrong if the task
    /// rebounded here after repeated failures.
    Design {
        task: String,
        requirements: Option<String>,
        failure_context: Option<String>,
    },
    /// Implementer: requirements and design, plus rejection feedback when
    /// looping back after a failed review.
    Implementation {
        task: String,
        requirements: Option<String>,
        design: Option<String>,
        feedback: Option<String>,
    },
    /// Gatekeeper: the submission under review.
    Review {
        reviewing: Option<SubmissionPayload>,
        requirements: Option<String>,
        design: Option<String>,
    },
}
