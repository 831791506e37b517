//! Crewflow Runner Library
//!
//! Default collaborator implementations and orchestration wiring around
//! [`crewflow_core`]: layered YAML configuration, filesystem agent
//! discovery, git branch-per-run integration, markdown run artifacts, and
//! the [`Orchestrator`] that drives the side-effect protocol.

pub mod agents;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod git;
pub mod orchestrator;

pub use agents::FsAgentProvider;
pub use artifacts::RunArtifacts;
pub use config::{AgentOverride, CrewConfig, GitConfig, GitMode, OutputConfig};
pub use error::{RunnerError, RunnerResult};
pub use git::GitWorkspace;
pub use orchestrator::Orchestrator;
