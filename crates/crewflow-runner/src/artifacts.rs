//! Markdown run artifacts.
//!
//! Each run gets a directory under the configured runs dir:
//!
//! ```text
//! <runs_dir>/<task_id>/
//!   task.md             created at start
//!   requirements.md     once the analyst confirms
//!   design.md           once the designer submits
//!   iterations/NN_role.md   one file per ledger entry
//!   summary.md          on completion
//! ```
//!
//! Artifacts are a write-only export. IO failures are logged and dropped;
//! they never fail the workflow.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crewflow_core::{
    ArtifactSink, Outcome, RoleType, Submission, SubmissionPayload, Task, TaskComplete,
};

use crate::config::OutputConfig;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `ArtifactSink` writing markdown under a runs directory.
pub struct RunArtifacts {
    runs_dir: PathBuf,
    verbose: bool,
}

impl RunArtifacts {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            runs_dir: PathBuf::from(&config.runs_dir),
            verbose: config.verbose,
        }
    }

    /// Resolve the runs dir against a workspace root instead of the
    /// process working directory.
    pub fn with_root(config: OutputConfig, root: &Path) -> Self {
        Self {
            runs_dir: root.join(&config.runs_dir),
            verbose: config.verbose,
        }
    }

    pub fn run_dir(&self, task_id: &str) -> PathBuf {
        self.runs_dir.join(task_id)
    }

    fn write(&self, path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "could not create artifact directory");
                return;
            }
        }
        match fs::write(path, content) {
            Ok(()) => {
                if self.verbose {
                    debug!(path = %path.display(), "wrote run artifact");
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not write run artifact");
            }
        }
    }

    fn write_requirements(&self, task: &Task) {
        let Some(requirements) = &task.confirmed_requirements else {
            return;
        };
        let content = format!(
            "# Requirements\n\n**Confirmed by:** analyst\n**Date:** {}\n\n{}\n",
            Utc::now().format(TIME_FORMAT),
            requirements
        );
        self.write(&self.run_dir(&task.id).join("requirements.md"), &content);
    }

    fn write_design(&self, task: &Task) {
        let Some(design) = &task.current_design else {
            return;
        };
        let content = format!(
            "# Design\n\n**Created by:** designer\n**Date:** {}\n\n{}\n",
            Utc::now().format(TIME_FORMAT),
            design
        );
        self.write(&self.run_dir(&task.id).join("design.md"), &content);
    }

    fn write_iteration(&self, task: &Task, submission: &Submission) {
        let mut content = format!(
            "# {} - Iteration {}\n\n**Role Type:** {}\n**Timestamp:** {}\n**Outcome:** {}\n\n",
            submission.role.to_uppercase(),
            submission.iteration,
            submission.kind,
            submission.timestamp.format(TIME_FORMAT),
            submission
                .outcome
                .map_or_else(|| "N/A".to_string(), |o| o.to_string()),
        );
        content.push_str(&render_payload(&submission.data));

        let filename = format!("{:02}_{}.md", submission.iteration, submission.role);
        self.write(
            &self.run_dir(&task.id).join("iterations").join(filename),
            &content,
        );
    }

    fn write_summary(&self, task: &Task, result: &TaskComplete) {
        let mut table = String::from("| # | Role | Outcome |\n|---|------|---------|\n");
        for sub in &task.submissions {
            match sub.kind {
                RoleType::Analyst | RoleType::Designer => {
                    table.push_str(&format!(
                        "| - | {} | {} |\n",
                        sub.role,
                        outcome_label(sub.outcome)
                    ));
                }
                RoleType::Implementer => {
                    table.push_str(&format!("| {} | {} | Submitted |\n", sub.iteration, sub.role));
                }
                RoleType::Gatekeeper => {
                    let mut outcome = outcome_label(sub.outcome);
                    if sub.data.is_rejection() {
                        if let Some(reason) = sub.data.reason() {
                            let short: String = reason.chars().take(50).collect();
                            outcome.push_str(&format!(" — {short}"));
                        }
                    }
                    table.push_str(&format!("| {} | {} | {} |\n", sub.iteration, sub.role, outcome));
                }
            }
        }

        let implementer_submissions = task
            .submissions
            .iter()
            .filter(|s| s.kind == RoleType::Implementer)
            .count();

        let mut content = format!(
            "# Run Summary\n\n## Task\n{}\n\n## Result: {}\n\n",
            task.description,
            if result.success {
                "✅ SUCCESS"
            } else {
                "❌ FAILED"
            }
        );
        if let Some(requirements) = &task.confirmed_requirements {
            content.push_str(&format!("## Requirements\n{requirements}\n\n"));
        }
        if let Some(design) = &task.current_design {
            content.push_str(&format!("## Design\n{design}\n\n"));
        }
        content.push_str(&format!(
            "## Iterations\n\n{table}\n**Implementer submissions:** {implementer_submissions}\n\n## Files Changed\n"
        ));
        for file in &result.files_changed {
            content.push_str(&format!("- {file}\n"));
        }
        if let Some(branch) = &result.branch {
            content.push_str(&format!(
                "\n## Git\n- **Branch:** `{branch}`\n- **Merge:** `git checkout main && git merge {branch}`\n"
            ));
        }
        content.push_str(&format!(
            "\n## Timeline\n- **Started:** {}\n- **Completed:** {}\n",
            task.created_at.format(TIME_FORMAT),
            format_optional(task.completed_at),
        ));

        self.write(&self.run_dir(&task.id).join("summary.md"), &content);
    }
}

impl ArtifactSink for RunArtifacts {
    fn on_start(&mut self, task: &Task) {
        let content = format!(
            "# Task\n\n{}\n\n**Started:** {}\n**Task ID:** {}\n",
            task.description,
            task.created_at.format(TIME_FORMAT),
            task.id
        );
        let run_dir = self.run_dir(&task.id);
        self.write(&run_dir.join("task.md"), &content);
        if let Err(err) = fs::create_dir_all(run_dir.join("iterations")) {
            warn!(error = %err, "could not create iterations directory");
        }
    }

    fn on_submission(&mut self, task: &Task, submission: &Submission) {
        self.write_requirements(task);
        self.write_design(task);
        self.write_iteration(task, submission);
    }

    fn on_complete(&mut self, task: &Task, result: &TaskComplete) {
        self.write_summary(task, result);
    }
}

fn render_payload(payload: &SubmissionPayload) -> String {
    match payload {
        SubmissionPayload::Questions { questions, .. } => {
            let mut s = String::from("## Questions\n\n");
            for q in questions {
                s.push_str(&format!("- {q}\n"));
            }
            s
        }
        SubmissionPayload::Requirements {
            confirmed_requirements,
        } => format!("## Confirmed Requirements\n\n{confirmed_requirements}\n"),
        SubmissionPayload::Design {
            design,
            patterns,
            warnings,
        } => {
            let mut s = format!("## Design\n\n{design}\n\n## Patterns\n\n");
            for p in patterns {
                s.push_str(&format!("- {p}\n"));
            }
            if !warnings.is_empty() {
                s.push_str("\n## Warnings\n\n");
                for w in warnings {
                    s.push_str(&format!("- {w}\n"));
                }
            }
            s
        }
        SubmissionPayload::Implementation {
            summary,
            files_changed,
            proof,
            concerns,
        } => {
            let mut s = format!("## Summary\n\n{summary}\n\n## Files Changed\n\n");
            for f in files_changed {
                s.push_str(&format!("- {f}\n"));
            }
            s.push_str(&format!(
                "\n## Proof\n\n```\n{}\n```\n",
                proof.as_deref().unwrap_or("N/A")
            ));
            if let Some(concerns) = concerns {
                s.push_str(&format!("\n## Concerns\n\n{concerns}\n"));
            }
            s
        }
        SubmissionPayload::Verdict {
            approved,
            reason,
            issues,
        } => {
            let mut s = format!(
                "## Decision\n\n**Approved:** {}\n\n## Reason\n\n{}\n",
                if *approved { "✅ Yes" } else { "❌ No" },
                reason.as_deref().unwrap_or("N/A")
            );
            if !approved && !issues.is_empty() {
                s.push_str("\n## Issues\n\n");
                for issue in issues {
                    s.push_str(&format!("- {issue}\n"));
                }
            }
            s
        }
        SubmissionPayload::UserAnswers { answers } => {
            format!("## User Answers\n\n{answers}\n")
        }
        SubmissionPayload::Aborted { reason } => format!("## Aborted\n\n{reason}\n"),
    }
}

fn outcome_label(outcome: Option<Outcome>) -> String {
    match outcome {
        Some(Outcome::Confirmed) => "✅ Requirements confirmed".to_string(),
        Some(Outcome::Submitted) => "✅ Design submitted".to_string(),
        Some(Outcome::Paused) => "⏸ Paused for user input".to_string(),
        Some(Outcome::Approved) => "✅ Approved".to_string(),
        Some(Outcome::Rejected) => "❌ Rejected".to_string(),
        Some(other) => other.to_string(),
        None => "N/A".to_string(),
    }
}

fn format_optional(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "N/A".to_string(), |t| t.format(TIME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn task_with(description: &str) -> Task {
        Task::new(description, "ba", Utc::now())
    }

    fn sink(dir: &TempDir) -> RunArtifacts {
        RunArtifacts::with_root(OutputConfig::default(), dir.path())
    }

    #[test]
    fn test_on_start_writes_task_file_and_iterations_dir() {
        let dir = TempDir::new().unwrap();
        let mut artifacts = sink(&dir);
        let task = task_with("Add caching");
        artifacts.on_start(&task);

        let run_dir = artifacts.run_dir(&task.id);
        let task_md = fs::read_to_string(run_dir.join("task.md")).unwrap();
        assert!(task_md.contains("Add caching"));
        assert!(task_md.contains(&task.id));
        assert!(run_dir.join("iterations").is_dir());
    }

    #[test]
    fn test_on_submission_writes_iteration_and_requirements() {
        let dir = TempDir::new().unwrap();
        let mut artifacts = sink(&dir);
        let mut task = task_with("Add caching");
        task.confirmed_requirements = Some("LRU cache, 1k entries".into());
        task.record(
            "ba",
            RoleType::Analyst,
            SubmissionPayload::Requirements {
                confirmed_requirements: "LRU cache, 1k entries".into(),
            },
            Some(Outcome::Confirmed),
            Utc::now(),
        );
        let submission = task.submissions.last().unwrap().clone();
        artifacts.on_submission(&task, &submission);

        let run_dir = artifacts.run_dir(&task.id);
        let requirements = fs::read_to_string(run_dir.join("requirements.md")).unwrap();
        assert!(requirements.contains("LRU cache, 1k entries"));

        let iteration =
            fs::read_to_string(run_dir.join("iterations").join("01_ba.md")).unwrap();
        assert!(iteration.contains("# BA - Iteration 1"));
        assert!(iteration.contains("## Confirmed Requirements"));
    }

    #[test]
    fn test_rejection_iteration_lists_issues() {
        let dir = TempDir::new().unwrap();
        let mut artifacts = sink(&dir);
        let mut task = task_with("t");
        task.iteration = 2;
        task.record(
            "qa",
            RoleType::Gatekeeper,
            SubmissionPayload::Verdict {
                approved: false,
                reason: Some("incomplete".into()),
                issues: vec!["no tests".into()],
            },
            Some(Outcome::Rejected),
            Utc::now(),
        );
        let submission = task.submissions.last().unwrap().clone();
        artifacts.on_submission(&task, &submission);

        let iteration = fs::read_to_string(
            artifacts
                .run_dir(&task.id)
                .join("iterations")
                .join("02_qa.md"),
        )
        .unwrap();
        assert!(iteration.contains("**Approved:** ❌ No"));
        assert!(iteration.contains("- no tests"));
    }

    #[test]
    fn test_summary_includes_table_files_and_branch() {
        let dir = TempDir::new().unwrap();
        let mut artifacts = sink(&dir);
        let mut task = task_with("Ship it");
        task.confirmed_requirements = Some("reqs".into());
        task.current_design = Some("the design".into());
        task.record(
            "coder",
            RoleType::Implementer,
            SubmissionPayload::Implementation {
                summary: "done".into(),
                files_changed: vec!["src/lib.rs".into()],
                proof: None,
                concerns: None,
            },
            Some(Outcome::Submitted),
            Utc::now(),
        );
        task.record(
            "qa",
            RoleType::Gatekeeper,
            SubmissionPayload::Verdict {
                approved: true,
                reason: None,
                issues: vec![],
            },
            Some(Outcome::Approved),
            Utc::now(),
        );
        task.completed_at = Some(Utc::now());

        let result = TaskComplete {
            success: true,
            summary: "Completed: Ship it".into(),
            iterations: 1,
            files_changed: vec!["src/lib.rs".into()],
            requirements: task.confirmed_requirements.clone(),
            design: task.current_design.clone(),
            branch: Some("crew/run-1".into()),
            run_path: ".crew/runs/run-1".into(),
        };
        artifacts.on_complete(&task, &result);

        let summary =
            fs::read_to_string(artifacts.run_dir(&task.id).join("summary.md")).unwrap();
        assert!(summary.contains("✅ SUCCESS"));
        assert!(summary.contains("| 1 | coder | Submitted |"));
        assert!(summary.contains("| 1 | qa | ✅ Approved |"));
        assert!(summary.contains("- src/lib.rs"));
        assert!(summary.contains("git merge crew/run-1"));
        assert!(summary.contains("**Implementer submissions:** 1"));
    }
}
