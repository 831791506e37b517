//! Tracing initialisation for hosts embedding the workflow.
//!
//! [`init_tracing`] configures the global subscriber once; later calls are
//! no-ops since the process-wide subscriber can only be installed once.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence for filtering; `level` is the fallback
/// verbosity when it is unset. With `json` the output is newline-delimited
/// JSON for log pipelines, otherwise a compact human format.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(false))
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().compact()).try_init().ok();
    }
}
