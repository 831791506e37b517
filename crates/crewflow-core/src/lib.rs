//! Crewflow Core Library
//!
//! The review-workflow state machine: a task moves through an ordered role
//! sequence (analyst, designer, implementer, gatekeeper), with typed
//! submissions, an append-only ledger, and a rejection / rebound /
//! escalation policy. Hosts plug in agent resolution, version control and
//! artifact output through the traits in [`collab`].

pub mod assignment;
pub mod collab;
pub mod error;
pub mod outcome;
pub mod pattern;
pub mod payload;
pub mod role;
pub mod session;
pub mod task;
pub mod telemetry;

pub use assignment::{Briefing, RoleAssignment};
pub use collab::{AgentProfile, AgentProvider, ArtifactSink, StaticAgentProvider, VersionControl};
pub use error::{WorkflowError, WorkflowResult};
pub use outcome::{
    SubmitOutcome, TaskComplete, TaskEscalate, TaskPaused, TaskReboundOffer, TaskStatus,
};
pub use pattern::detect_failure_pattern;
pub use payload::SubmissionPayload;
pub use role::{OnMaxIterations, RoleType, WorkflowRole, WorkflowSpec};
pub use session::WorkflowSession;
pub use task::{Outcome, Submission, Task, TaskState};
pub use telemetry::init_tracing;

/// Crewflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
