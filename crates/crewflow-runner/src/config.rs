//! Layered YAML configuration.
//!
//! Configuration is read from `config.yaml` in up to two locations and
//! deep-merged over the built-in defaults, in order:
//!
//! 1. built-in defaults (this module)
//! 2. `~/.crewflow/config.yaml` (user)
//! 3. `<workspace>/.crew/config.yaml` (project)
//!
//! Mapping values merge recursively; scalars and sequences from a later
//! layer replace earlier ones. Missing files are empty layers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crewflow_core::{OnMaxIterations, RoleType, WorkflowRole, WorkflowSpec};

use crate::error::{RunnerError, RunnerResult};

/// How the git workspace behaves during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitMode {
    /// Create a prefixed branch per task (default).
    #[default]
    Branch,
    /// Commit onto whatever branch is checked out.
    Current,
    /// No git operations at all.
    None,
}

/// Git integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    pub mode: GitMode,
    pub branch_prefix: String,
    /// Template with `{role}` and `{summary}` placeholders.
    pub commit_message_format: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            mode: GitMode::Branch,
            branch_prefix: "crew/".to_string(),
            commit_message_format: "crew({role}): {summary}".to_string(),
        }
    }
}

/// Run artifact settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub runs_dir: String,
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            runs_dir: ".crew/runs".to_string(),
            verbose: true,
        }
    }
}

/// Per-agent overrides from the `agents:` config section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOverride {
    /// Overrides the workflow entry's role type.
    #[serde(rename = "type")]
    pub kind: Option<RoleType>,
    pub stance: Option<String>,
    pub context: Vec<String>,
}

/// The fully merged and typed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CrewConfig {
    pub version: u32,
    pub workflow: WorkflowSpec,
    /// Global rules attached to every role assignment.
    pub rules: Vec<String>,
    /// Context file patterns: the `always` key applies to every role,
    /// other keys are role names.
    pub context: BTreeMap<String, Vec<String>>,
    pub git: GitConfig,
    pub output: OutputConfig,
    pub agents: BTreeMap<String, AgentOverride>,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            version: 1,
            workflow: WorkflowSpec::standard(),
            rules: Vec::new(),
            context: BTreeMap::new(),
            git: GitConfig::default(),
            output: OutputConfig::default(),
            agents: BTreeMap::new(),
        }
    }
}

impl CrewConfig {
    /// Load the layered configuration for a workspace.
    pub fn load(workspace_root: &Path) -> RunnerResult<Self> {
        let mut paths = Vec::new();
        if let Some(user_dir) = user_config_dir() {
            paths.push(user_dir.join("config.yaml"));
        }
        paths.push(project_config_dir(workspace_root).join("config.yaml"));
        Self::load_layers(&paths)
    }

    /// Merge the given `config.yaml` paths, in order, over the defaults.
    pub fn load_layers(paths: &[PathBuf]) -> RunnerResult<Self> {
        let mut merged = Value::Mapping(Mapping::new());
        for path in paths {
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(path).map_err(|source| RunnerError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let layer: Value =
                serde_yaml::from_str(&text).map_err(|source| RunnerError::Config {
                    path: path.display().to_string(),
                    source,
                })?;
            // An empty file parses as null; treat it as an empty layer.
            if !layer.is_null() {
                deep_merge(&mut merged, layer);
            }
        }
        let raw: RawConfig =
            serde_yaml::from_value(merged).map_err(|source| RunnerError::Config {
                path: "<merged config>".to_string(),
                source,
            })?;
        raw.into_config()
    }
}

/// The user's global config directory, `~/.crewflow`.
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".crewflow"))
}

/// The project-local config directory, `<workspace>/.crew`.
pub fn project_config_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".crew")
}

/// Recursively merge `overlay` into `base`.
///
/// Two mappings merge key by key; any other pairing replaces the base
/// value wholesale.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_mapping() && value.is_mapping() => {
                        deep_merge(existing, value);
                    }
                    Some(existing) => *existing = value,
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// ---- raw layer (permissive YAML shapes) ---------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    version: Option<u32>,
    workflow: RawWorkflow,
    rules: Vec<String>,
    context: BTreeMap<String, Vec<String>>,
    git: RawGit,
    output: RawOutput,
    agents: BTreeMap<String, AgentOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWorkflow {
    sequence: Vec<RawRole>,
    max_iterations: Option<u32>,
    rebound: RawRebound,
    on_max_iterations: Option<OnMaxIterations>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    role: String,
    #[serde(rename = "type", default)]
    kind: Option<RoleType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRebound {
    after_failures: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGit {
    mode: Option<GitMode>,
    branch_prefix: Option<String>,
    commit_message_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutput {
    runs_dir: Option<String>,
    verbose: Option<bool>,
}

impl RawConfig {
    fn into_config(self) -> RunnerResult<CrewConfig> {
        let defaults = CrewConfig::default();

        let mut workflow = defaults.workflow;
        if !self.workflow.sequence.is_empty() {
            workflow.sequence = self
                .workflow
                .sequence
                .into_iter()
                .map(|r| WorkflowRole::new(r.role, r.kind.unwrap_or(RoleType::Implementer)))
                .collect();
        }
        if let Some(max) = self.workflow.max_iterations {
            workflow.max_iterations = max;
        }
        if let Some(after) = self.workflow.rebound.after_failures {
            workflow.rebound_after_failures = after;
        }
        if let Some(on_max) = self.workflow.on_max_iterations {
            workflow.on_max_iterations = on_max;
        }
        workflow.validate()?;

        let mut git = defaults.git;
        if let Some(mode) = self.git.mode {
            git.mode = mode;
        }
        if let Some(prefix) = self.git.branch_prefix {
            git.branch_prefix = prefix;
        }
        if let Some(format) = self.git.commit_message_format {
            git.commit_message_format = format;
        }

        let mut output = defaults.output;
        if let Some(runs_dir) = self.output.runs_dir {
            output.runs_dir = runs_dir;
        }
        if let Some(verbose) = self.output.verbose {
            output.verbose = verbose;
        }

        Ok(CrewConfig {
            version: self.version.unwrap_or(defaults.version),
            workflow,
            rules: self.rules,
            context: self.context,
            git,
            output,
            agents: self.agents,
        })
    }
}
