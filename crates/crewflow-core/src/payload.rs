//! Typed submission payloads, one variant per role-type contract.
//!
//! The `serde(tag = "kind")` discriminant replaces the key-probing of an
//! untyped map: a payload either deserializes into the variant its role
//! demands or the submission is rejected at the boundary.

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};
use crate::role::RoleType;

/// Work submitted by a role, shaped by that role's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionPayload {
    /// Analyst needs human input before requirements can be confirmed.
    Questions {
        questions: Vec<String>,
        /// What the analyst understood so far.
        #[serde(default)]
        context: String,
        /// Any requirements already clear.
        #[serde(default)]
        partial_spec: Option<String>,
    },
    /// Analyst confirms the requirements.
    Requirements { confirmed_requirements: String },
    /// Designer submits the technical approach.
    Design {
        design: String,
        #[serde(default)]
        patterns: Vec<String>,
        #[serde(default)]
        warnings: Vec<String>,
    },
    /// Implementer submits work for review; recorded verbatim and forwarded
    /// to the gatekeeper as the `reviewing` context.
    Implementation {
        summary: String,
        #[serde(default)]
        files_changed: Vec<String>,
        #[serde(default)]
        proof: Option<String>,
        #[serde(default)]
        concerns: Option<String>,
    },
    /// Gatekeeper approves or rejects the work under review.
    Verdict {
        approved: bool,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        issues: Vec<String>,
    },
    /// Human answers recorded when a paused task is resumed.
    UserAnswers { answers: String },
    /// Synthetic entry appended when a task is aborted.
    Aborted { reason: String },
}

impl SubmissionPayload {
    /// The role type whose contract this payload satisfies.
    ///
    /// `UserAnswers` settles an analyst question round; `Aborted` is a
    /// synthetic ledger entry attributed to the implementer lane.
    pub fn producing_role(&self) -> RoleType {
        match self {
            SubmissionPayload::Questions { .. }
            | SubmissionPayload::Requirements { .. }
            | SubmissionPayload::UserAnswers { .. } => RoleType::Analyst,
            SubmissionPayload::Design { .. } => RoleType::Designer,
            SubmissionPayload::Implementation { .. } | SubmissionPayload::Aborted { .. } => {
                RoleType::Implementer
            }
            SubmissionPayload::Verdict { .. } => RoleType::Gatekeeper,
        }
    }

    /// The serde discriminant, used in error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            SubmissionPayload::Questions { .. } => "questions",
            SubmissionPayload::Requirements { .. } => "requirements",
            SubmissionPayload::Design { .. } => "design",
            SubmissionPayload::Implementation { .. } => "implementation",
            SubmissionPayload::Verdict { .. } => "verdict",
            SubmissionPayload::UserAnswers { .. } => "user_answers",
            SubmissionPayload::Aborted { .. } => "aborted",
        }
    }

    /// Reject payloads whose mandatory fields are present but empty.
    ///
    /// A missing key already fails at deserialization; this closes the gap
    /// of a key that is present and blank. Fail fast, never default.
    pub fn validate(&self) -> WorkflowResult<()> {
        match self {
            SubmissionPayload::Questions { questions, .. } if questions.is_empty() => {
                Err(WorkflowError::MissingField {
                    kind: RoleType::Analyst,
                    field: "questions",
                })
            }
            SubmissionPayload::Requirements {
                confirmed_requirements,
            } if confirmed_requirements.trim().is_empty() => Err(WorkflowError::MissingField {
                kind: RoleType::Analyst,
                field: "confirmed_requirements",
            }),
            SubmissionPayload::Design { design, .. } if design.trim().is_empty() => {
                Err(WorkflowError::MissingField {
                    kind: RoleType::Designer,
                    field: "design",
                })
            }
            _ => Ok(()),
        }
    }

    /// Whether this is a gatekeeper rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SubmissionPayload::Verdict { approved: false, .. })
    }

    /// Rejection or abort reason, if this payload carries one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            SubmissionPayload::Verdict { reason, .. } => reason.as_deref(),
            SubmissionPayload::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Issue list of a gatekeeper verdict; empty for everything else.
    pub fn issues(&self) -> &[String] {
        match self {
            SubmissionPayload::Verdict { issues, .. } => issues,
            _ => &[],
        }
    }

    /// Files touched by an implementer submission; empty for everything else.
    pub fn files_changed(&self) -> &[String] {
        match self {
            SubmissionPayload::Implementation { files_changed, .. } => files_changed,
            _ => &[],
        }
    }
}
