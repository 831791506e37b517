//! Filesystem agent discovery and resolution.
//!
//! Each agent lives in `agents/<name>/` under a config layer directory:
//! `prompt.md` holds the system prompt (mandatory), `agent.yaml` optionally
//! declares the role type, a stance, and extra context patterns. Layers are
//! searched project first, then user, so a project can override a shared
//! agent wholesale.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::warn;
use walkdir::WalkDir;

use crewflow_core::{AgentProfile, AgentProvider, RoleType, WorkflowError, WorkflowResult};

use crate::config::{project_config_dir, user_config_dir, CrewConfig};

/// Optional `agent.yaml` next to an agent's prompt. Keys this crate does
/// not consume (`stance`) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentManifest {
    #[serde(rename = "type")]
    kind: Option<RoleType>,
    context: Vec<String>,
}

/// `AgentProvider` backed by layered `agents/` directories.
pub struct FsAgentProvider {
    /// Layer roots in resolution order (first match wins).
    search_dirs: Vec<PathBuf>,
    workspace_root: PathBuf,
    config: CrewConfig,
    /// Role types the workflow sequence declares, the resolution fallback.
    declared: HashMap<String, RoleType>,
}

impl FsAgentProvider {
    pub fn new(
        config: CrewConfig,
        workspace_root: impl Into<PathBuf>,
        search_dirs: Vec<PathBuf>,
    ) -> Self {
        let declared = config
            .workflow
            .sequence
            .iter()
            .map(|entry| (entry.role.clone(), entry.kind))
            .collect();
        Self {
            search_dirs,
            workspace_root: workspace_root.into(),
            config,
            declared,
        }
    }

    /// Provider over the standard layers: project `.crew/`, then user
    /// `~/.crewflow/`.
    pub fn with_standard_dirs(config: CrewConfig, workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let mut search_dirs = vec![project_config_dir(&workspace_root)];
        if let Some(user_dir) = user_config_dir() {
            search_dirs.push(user_dir);
        }
        Self::new(config, workspace_root, search_dirs)
    }

    /// Every agent name with a `prompt.md` in any layer, sorted.
    pub fn discover_agents(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for layer in &self.search_dirs {
            let agents_dir = layer.join("agents");
            let Ok(entries) = fs::read_dir(&agents_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && path.join("prompt.md").is_file() {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        names.into_iter().collect()
    }

    fn load_prompt(&self, role: &str) -> Option<String> {
        for layer in &self.search_dirs {
            let path = layer.join("agents").join(role).join("prompt.md");
            if !path.is_file() {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(prompt) => return Some(prompt),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable agent prompt");
                }
            }
        }
        None
    }

    fn load_manifest(&self, role: &str) -> Option<AgentManifest> {
        for layer in &self.search_dirs {
            let path = layer.join("agents").join(role).join("agent.yaml");
            if !path.is_file() {
                continue;
            }
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_yaml::from_str::<AgentManifest>(&text) {
                Ok(manifest) => return Some(manifest),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "invalid agent manifest");
                }
            }
        }
        None
    }

    /// Effective role type: the agent's own declaration wins, then the
    /// config override, then the workflow entry; implementer as the last
    /// resort for agents outside the sequence.
    fn effective_kind(&self, role: &str, manifest: Option<&AgentManifest>) -> RoleType {
        manifest
            .and_then(|m| m.kind)
            .or_else(|| self.config.agents.get(role).and_then(|a| a.kind))
            .or_else(|| self.declared.get(role).copied())
            .unwrap_or(RoleType::Implementer)
    }
}

impl AgentProvider for FsAgentProvider {
    fn resolve(&self, role: &str) -> WorkflowResult<AgentProfile> {
        let instructions = self
            .load_prompt(role)
            .ok_or_else(|| WorkflowError::AgentNotFound {
                role: role.to_string(),
            })?;
        let manifest = self.load_manifest(role);
        Ok(AgentProfile {
            name: role.to_string(),
            kind: self.effective_kind(role, manifest.as_ref()),
            instructions,
        })
    }

    fn context_files(&self, role: &str) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        if let Some(always) = self.config.context.get("always") {
            patterns.extend(always.iter().cloned());
        }
        if let Some(role_context) = self.config.context.get(role) {
            patterns.extend(role_context.iter().cloned());
        }
        if let Some(agent) = self.config.agents.get(role) {
            patterns.extend(agent.context.iter().cloned());
        }
        if let Some(manifest) = self.load_manifest(role) {
            patterns.extend(manifest.context);
        }
        expand_patterns(&patterns, &self.workspace_root)
    }
}

/// Expand glob patterns against a base directory.
///
/// `**` crosses directory separators, `*` and `?` do not. Literal entries
/// are kept only when the file exists. Results are relative paths with
/// `/` separators, de-duplicated in first-seen order.
pub fn expand_patterns(patterns: &[String], base: &Path) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    let mut push = |path: String, out: &mut Vec<String>| {
        if !out.iter().any(|p| p == &path) {
            out.push(path);
        }
    };

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') {
            let Some(matcher) = glob_regex(pattern) else {
                warn!(pattern = %pattern, "unusable context pattern");
                continue;
            };
            for entry in WalkDir::new(base)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(base) else {
                    continue;
                };
                let rel = rel.to_string_lossy().replace('\\', "/");
                if matcher.is_match(&rel) {
                    push(rel, &mut expanded);
                }
            }
        } else if base.join(pattern).is_file() {
            push(pattern.clone(), &mut expanded);
        }
    }
    expanded
}

/// Translate a glob pattern into an anchored regex.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut source = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // "**/" matches zero or more whole directories.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        source.push_str("(?:.*/)?");
                    } else {
                        source.push_str(".*");
                    }
                } else {
                    source.push_str("[^/]*");
                }
            }
            '?' => source.push_str("[^/]"),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}
