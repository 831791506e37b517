//! Git integration: branch-per-run and commit-on-submit.
//!
//! Shells out to the `git` binary. Every operation degrades to a `false`
//! return plus a log line; the workflow itself never fails on git.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};

use crewflow_core::VersionControl;

use crate::config::{GitConfig, GitMode};

/// `VersionControl` over a git checkout at `root`.
pub struct GitWorkspace {
    config: GitConfig,
    root: PathBuf,
    working_branch: Option<String>,
    original_branch: Option<String>,
}

impl GitWorkspace {
    pub fn new(config: GitConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            working_branch: None,
            original_branch: None,
        }
    }

    /// The branch that was checked out before `start_run` switched away.
    pub fn original_branch(&self) -> Option<&str> {
        self.original_branch.as_deref()
    }

    fn run_git(&self, args: &[&str]) -> (bool, String) {
        match Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
        {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    debug!(args = ?args, stderr = %stderr, "git command failed");
                }
                (output.status.success(), stdout)
            }
            Err(err) => {
                warn!(error = %err, "could not spawn git");
                (false, String::new())
            }
        }
    }

    pub fn is_git_repo(&self) -> bool {
        self.run_git(&["rev-parse", "--git-dir"]).0
    }

    /// Branch currently checked out, if HEAD resolves.
    pub fn head_branch(&self) -> Option<String> {
        let (ok, stdout) = self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"]);
        ok.then_some(stdout)
    }
}

impl VersionControl for GitWorkspace {
    fn start_run(&mut self, task_id: &str) -> bool {
        match self.config.mode {
            GitMode::None => true,
            GitMode::Branch => {
                if !self.is_git_repo() {
                    warn!(root = %self.root.display(), "not a git repository");
                    return false;
                }
                self.original_branch = self.head_branch();
                let branch = format!("{}{}", self.config.branch_prefix, task_id);
                let (ok, _) = self.run_git(&["checkout", "-b", &branch]);
                if ok {
                    debug!(branch = %branch, "created run branch");
                    self.working_branch = Some(branch);
                }
                ok
            }
            GitMode::Current => {
                if !self.is_git_repo() {
                    return false;
                }
                self.working_branch = self.head_branch();
                true
            }
        }
    }

    fn commit(&mut self, role: &str, summary: &str, files: &[String]) -> bool {
        if self.config.mode == GitMode::None {
            return true;
        }
        if !self.is_git_repo() {
            return false;
        }

        if files.is_empty() {
            self.run_git(&["add", "-A"]);
        } else {
            for file in files {
                self.run_git(&["add", file]);
            }
        }

        // Exit 0 means the index is clean; nothing to commit is not a
        // failure.
        if self.run_git(&["diff", "--cached", "--quiet"]).0 {
            return true;
        }

        let message = self
            .config
            .commit_message_format
            .replace("{role}", role)
            .replace("{summary}", summary);
        self.run_git(&["commit", "-m", &message]).0
    }

    fn complete_run(&mut self) -> bool {
        if self.config.mode == GitMode::Current {
            return self.commit("complete", "task completed", &[]);
        }
        true
    }

    fn branch_name(&self) -> Option<String> {
        self.working_branch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git(dir: &TempDir, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    /// A repository with one commit, identity configured.
    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(&dir, &["init"]);
        git(&dir, &["config", "user.email", "test@example.com"]);
        git(&dir, &["config", "user.name", "Test"]);
        fs::write(dir.path().join("README.md"), "init").unwrap();
        git(&dir, &["add", "-A"]);
        git(&dir, &["commit", "-m", "initial"]);
        dir
    }

    fn last_commit_message(workspace: &GitWorkspace) -> String {
        workspace.run_git(&["log", "-1", "--format=%s"]).1
    }

    #[test]
    fn test_branch_mode_creates_prefixed_branch() {
        let dir = repo();
        let mut workspace = GitWorkspace::new(GitConfig::default(), dir.path());
        assert!(workspace.start_run("2024-01-01_120000_task"));
        assert_eq!(
            workspace.branch_name().as_deref(),
            Some("crew/2024-01-01_120000_task")
        );
        assert_eq!(
            workspace.head_branch().as_deref(),
            Some("crew/2024-01-01_120000_task")
        );
        assert!(workspace.original_branch().is_some());
    }

    #[test]
    fn test_branch_mode_fails_outside_a_repo() {
        let dir = TempDir::new().unwrap();
        let mut workspace = GitWorkspace::new(GitConfig::default(), dir.path());
        assert!(!workspace.start_run("task"));
        assert!(workspace.branch_name().is_none());
    }

    #[test]
    fn test_none_mode_is_a_successful_noop() {
        let dir = TempDir::new().unwrap();
        let config = GitConfig {
            mode: GitMode::None,
            ..GitConfig::default()
        };
        let mut workspace = GitWorkspace::new(config, dir.path());
        assert!(workspace.start_run("task"));
        assert!(workspace.commit("coder", "anything", &[]));
        assert!(workspace.complete_run());
        assert!(workspace.branch_name().is_none());
    }

    #[test]
    fn test_commit_stages_named_files_with_formatted_message() {
        let dir = repo();
        let mut workspace = GitWorkspace::new(GitConfig::default(), dir.path());
        workspace.start_run("task");

        fs::write(dir.path().join("a.txt"), "change").unwrap();
        assert!(workspace.commit("coder", "add a.txt", &["a.txt".to_string()]));
        assert_eq!(last_commit_message(&workspace), "crew(coder): add a.txt");
    }

    #[test]
    fn test_commit_with_clean_tree_succeeds_without_committing() {
        let dir = repo();
        let mut workspace = GitWorkspace::new(GitConfig::default(), dir.path());
        workspace.start_run("task");
        assert!(workspace.commit("coder", "nothing", &[]));
        assert_eq!(last_commit_message(&workspace), "initial");
    }

    #[test]
    fn test_current_mode_commits_on_complete() {
        let dir = repo();
        let config = GitConfig {
            mode: GitMode::Current,
            ..GitConfig::default()
        };
        let mut workspace = GitWorkspace::new(config, dir.path());
        workspace.start_run("task");

        fs::write(dir.path().join("b.txt"), "change").unwrap();
        assert!(workspace.complete_run());
        assert_eq!(
            last_commit_message(&workspace),
            "crew(complete): task completed"
        );
    }
}
