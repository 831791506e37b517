//! Role vocabulary and the workflow sequence: `RoleType`, `WorkflowRole`,
//! `WorkflowSpec`.

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};

/// The four role archetypes of a staged review workflow.
///
/// The role type governs both the submission shape a role produces and how
/// the sequencer reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// Clarifies requirements; may pause the task with questions.
    Analyst,
    /// Produces the technical design.
    Designer,
    /// Produces the implementation under review.
    Implementer,
    /// Approves or rejects the implementation.
    Gatekeeper,
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoleType::Analyst => "analyst",
            RoleType::Designer => "designer",
            RoleType::Implementer => "implementer",
            RoleType::Gatekeeper => "gatekeeper",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RoleType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> WorkflowResult<Self> {
        match s {
            "analyst" => Ok(RoleType::Analyst),
            "designer" => Ok(RoleType::Designer),
            "implementer" => Ok(RoleType::Implementer),
            "gatekeeper" => Ok(RoleType::Gatekeeper),
            other => Err(WorkflowError::UnknownRoleType(other.to_string())),
        }
    }
}

/// A named participant in the workflow sequence, bound to one role type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRole {
    /// Role name, e.g. "ba", "architect", "coder", "qa".
    pub role: String,
    /// Behavioral category of the role.
    #[serde(rename = "type")]
    pub kind: RoleType,
}

impl WorkflowRole {
    pub fn new(role: impl Into<String>, kind: RoleType) -> Self {
        Self {
            role: role.into(),
            kind,
        }
    }
}

/// What to do when the iteration budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnMaxIterations {
    /// Hand the task back to a human with a suggestion (default).
    #[default]
    Escalate,
    /// Mark the task failed outright.
    Fail,
}

impl std::str::FromStr for OnMaxIterations {
    type Err = WorkflowError;

    fn from_str(s: &str) -> WorkflowResult<Self> {
        match s {
            "escalate" => Ok(OnMaxIterations::Escalate),
            "fail" => Ok(OnMaxIterations::Fail),
            other => Err(WorkflowError::InvalidSpec(format!(
                "unknown on_max_iterations value: {other}"
            ))),
        }
    }
}

/// The ordered role sequence plus the policy scalars that drive the
/// rejection / rebound / escalation logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Ordered roles the task moves through.
    pub sequence: Vec<WorkflowRole>,
    /// Iteration budget; exceeding it escalates (or fails) the task.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Consecutive gatekeeper rejections before a design rebound is offered.
    #[serde(default = "default_rebound_after_failures")]
    pub rebound_after_failures: u32,
    /// Behavior when `max_iterations` is exceeded.
    #[serde(default)]
    pub on_max_iterations: OnMaxIterations,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_rebound_after_failures() -> u32 {
    3
}

impl Default for WorkflowSpec {
    fn default() -> Self {
        Self::standard()
    }
}

impl WorkflowSpec {
    /// The canonical four-role sequence: ba -> architect -> coder -> qa.
    pub fn standard() -> Self {
        Self {
            sequence: vec![
                WorkflowRole::new("ba", RoleType::Analyst),
                WorkflowRole::new("architect", RoleType::Designer),
                WorkflowRole::new("coder", RoleType::Implementer),
                WorkflowRole::new("qa", RoleType::Gatekeeper),
            ],
            max_iterations: default_max_iterations(),
            rebound_after_failures: default_rebound_after_failures(),
            on_max_iterations: OnMaxIterations::Escalate,
        }
    }

    /// Validate the policy scalars and sequence shape.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidSpec` for an empty sequence or a
    /// zero-valued policy scalar.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.sequence.is_empty() {
            return Err(WorkflowError::InvalidSpec(
                "workflow sequence must not be empty".to_string(),
            ));
        }
        if self.max_iterations < 1 {
            return Err(WorkflowError::InvalidSpec(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if self.rebound_after_failures < 1 {
            return Err(WorkflowError::InvalidSpec(
                "rebound_after_failures must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Index of the first role declared with the given type, if any.
    pub fn index_of_kind(&self, kind: RoleType) -> Option<usize> {
        self.sequence.iter().position(|r| r.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_type_display_round_trips() {
        for kind in [
            RoleType::Analyst,
            RoleType::Designer,
            RoleType::Implementer,
            RoleType::Gatekeeper,
        ] {
            assert_eq!(RoleType::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_role_type_from_str_rejects_unknown() {
        let err = RoleType::from_str("auditor").unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownRoleType(_)));
    }

    #[test]
    fn test_standard_spec_is_valid() {
        let spec = WorkflowSpec::standard();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.sequence.len(), 4);
        assert_eq!(spec.max_iterations, 5);
        assert_eq!(spec.rebound_after_failures, 3);
    }

    #[test]
    fn test_empty_sequence_is_invalid() {
        let spec = WorkflowSpec {
            sequence: vec![],
            ..WorkflowSpec::standard()
        };
        assert!(matches!(
            spec.validate().unwrap_err(),
            WorkflowError::InvalidSpec(_)
        ));
    }

    #[test]
    fn test_zero_policy_scalars_are_invalid() {
        let spec = WorkflowSpec {
            max_iterations: 0,
            ..WorkflowSpec::standard()
        };
        assert!(spec.validate().is_err());

        let spec = WorkflowSpec {
            rebound_after_failures: 0,
            ..WorkflowSpec::standard()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_index_of_kind_finds_first_match() {
        let spec = WorkflowSpec::standard();
        assert_eq!(spec.index_of_kind(RoleType::Implementer), Some(2));
        assert_eq!(spec.index_of_kind(RoleType::Designer), Some(1));

        let spec = WorkflowSpec {
            sequence: vec![
                WorkflowRole::new("coder", RoleType::Implementer),
                WorkflowRole::new("qa", RoleType::Gatekeeper),
            ],
            ..WorkflowSpec::standard()
        };
        assert_eq!(spec.index_of_kind(RoleType::Designer), None);
    }

    #[test]
    fn test_workflow_role_serde_uses_type_key() {
        let role = WorkflowRole::new("ba", RoleType::Analyst);
        let json = serde_json::to_string(&role).unwrap();
        assert!(json.contains("\"type\":\"analyst\""));
    }
}
