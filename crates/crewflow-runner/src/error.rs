//! Runner-layer error taxonomy.

use thiserror::Error;

use crewflow_core::WorkflowError;

/// Errors from configuration loading and orchestration wiring.
///
/// Version control and artifact failures are deliberately absent: those
/// collaborators are fire-and-forget and report through logs, never
/// through the result channel.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
