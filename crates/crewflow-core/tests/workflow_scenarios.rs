//! End-to-end scenarios driving `WorkflowSession` through full task runs:
//! the happy path, pause/resume, rejection loops, rebounds, escalation,
//! and abort.

use std::sync::Arc;

use crewflow_core::{
    Briefing, OnMaxIterations, Outcome, RoleType, StaticAgentProvider, SubmissionPayload,
    SubmitOutcome, TaskState, WorkflowError, WorkflowRole, WorkflowSession, WorkflowSpec,
};

fn session_with(spec: WorkflowSpec) -> WorkflowSession {
    let provider = Arc::new(StaticAgentProvider::for_spec(&spec));
    WorkflowSession::new(spec, provider).unwrap()
}

fn standard_session() -> WorkflowSession {
    session_with(WorkflowSpec::standard())
}

fn requirements() -> SubmissionPayload {
    SubmissionPayload::Requirements {
        confirmed_requirements: "Return 429 above 100 requests per minute".into(),
    }
}

fn design() -> SubmissionPayload {
    SubmissionPayload::Design {
        design: "Token bucket keyed by client id, checked in middleware".into(),
        patterns: vec!["middleware".into()],
        warnings: vec![],
    }
}

fn implementation(files: &[&str]) -> SubmissionPayload {
    SubmissionPayload::Implementation {
        summary: "Added token bucket middleware".into(),
        files_changed: files.iter().map(|s| s.to_string()).collect(),
        proof: Some("unit tests pass".into()),
        concerns: None,
    }
}

fn approval() -> SubmissionPayload {
    SubmissionPayload::Verdict {
        approved: true,
        reason: Some("meets the requirements".into()),
        issues: vec![],
    }
}

fn rejection(reason: &str, issues: &[&str]) -> SubmissionPayload {
    SubmissionPayload::Verdict {
        approved: false,
        reason: Some(reason.into()),
        issues: issues.iter().map(|s| s.to_string()).collect(),
    }
}

/// Drive a fresh task up to the gatekeeper's desk.
fn drive_to_gatekeeper(session: &mut WorkflowSession, files: &[&str]) {
    session.start_task("Add rate limiting to the API").unwrap();
    session.submit(requirements()).unwrap();
    session.submit(design()).unwrap();
    let outcome = session.submit(implementation(files)).unwrap();
    match outcome {
        SubmitOutcome::Assignment(a) => assert_eq!(a.kind, RoleType::Gatekeeper),
        other => panic!("expected gatekeeper assignment, got {other:?}"),
    }
}

#[test]
fn happy_path_runs_the_full_sequence() {
    let mut session = standard_session();

    let first = session.start_task("Add rate limiting to the API").unwrap();
    assert_eq!(first.role, "ba");
    assert!(matches!(first.briefing, Briefing::Analysis { .. }));

    let to_architect = session.submit(requirements()).unwrap();
    let SubmitOutcome::Assignment(a) = to_architect else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "architect");
    match a.briefing {
        Briefing::Design {
            requirements: Some(reqs),
            failure_context: None,
            ..
        } => assert!(reqs.contains("429")),
        other => panic!("unexpected briefing: {other:?}"),
    }

    let to_coder = session.submit(design()).unwrap();
    let SubmitOutcome::Assignment(a) = to_coder else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "coder");
    match a.briefing {
        Briefing::Implementation {
            design: Some(d),
            feedback: None,
            ..
        } => assert!(d.contains("Token bucket")),
        other => panic!("unexpected briefing: {other:?}"),
    }

    let to_qa = session
        .submit(implementation(&["src/middleware.rs", "src/limits.rs"]))
        .unwrap();
    let SubmitOutcome::Assignment(a) = to_qa else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "qa");
    match a.briefing {
        Briefing::Review {
            reviewing: Some(SubmissionPayload::Implementation { ref summary, .. }),
            ..
        } => assert!(summary.contains("token bucket")),
        other => panic!("unexpected briefing: {other:?}"),
    }

    let done = session.submit(approval()).unwrap();
    let SubmitOutcome::Complete(result) = done else {
        panic!("expected completion");
    };
    assert!(result.success);
    assert_eq!(result.iterations, 1);
    assert_eq!(
        result.files_changed,
        vec!["src/middleware.rs", "src/limits.rs"]
    );
    assert!(result.summary.starts_with("Completed: "));
    assert!(result.run_path.ends_with(&session.task().unwrap().id));

    let task = session.task().unwrap();
    assert_eq!(task.state, TaskState::Complete);
    assert!(task.completed_at.is_some());
    assert_eq!(task.submissions.len(), 4);
}

#[test]
fn analyst_questions_pause_the_task() {
    let mut session = standard_session();
    session.start_task("Do the thing").unwrap();

    let outcome = session
        .submit(SubmissionPayload::Questions {
            questions: vec!["Which thing?".into(), "By when?".into()],
            context: "The request is ambiguous".into(),
            partial_spec: None,
        })
        .unwrap();
    let SubmitOutcome::Paused(paused) = outcome else {
        panic!("expected pause");
    };
    assert_eq!(paused.role, "ba");
    assert_eq!(paused.questions.len(), 2);
    assert_eq!(session.task().unwrap().state, TaskState::Paused);

    // A paused task refuses further submissions.
    let err = session.submit(requirements()).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::TaskSuspended {
            state: TaskState::Paused
        }
    ));

    // Resume records the answers and hands the task to the designer.
    let outcome = session.resume("The rate limiter. End of sprint.").unwrap();
    let SubmitOutcome::Assignment(a) = outcome else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "architect");

    let task = session.task().unwrap();
    assert_eq!(task.state, TaskState::InProgress);
    assert_eq!(
        task.user_answers.as_deref(),
        Some("The rate limiter. End of sprint.")
    );
    let answers = &task.submissions.last().unwrap();
    assert_eq!(answers.outcome, Some(Outcome::Resumed));
    assert!(matches!(
        answers.data,
        SubmissionPayload::UserAnswers { .. }
    ));
}

#[test]
fn rejection_loops_back_to_the_implementer_with_feedback() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);

    let outcome = session
        .submit(rejection(
            "Implementation is incomplete",
            &["no error handling", "missing tests"],
        ))
        .unwrap();
    let SubmitOutcome::Assignment(a) = outcome else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "coder");
    assert_eq!(a.iteration, 2);
    match a.briefing {
        Briefing::Implementation {
            feedback: Some(fb), ..
        } => {
            assert!(fb.starts_with("Implementation is incomplete"));
            assert!(fb.contains("Issues:\n- no error handling\n- missing tests"));
        }
        other => panic!("unexpected briefing: {other:?}"),
    }

    let task = session.task().unwrap();
    assert_eq!(task.iteration, 2);
    assert_eq!(task.coder_failures, 1);
    assert_eq!(task.state, TaskState::InProgress);
}

#[test]
fn approval_resets_the_failure_streak() {
    // One gatekeeper, then a second implementer/gatekeeper pair, so an
    // approval mid-sequence can be observed.
    let spec = WorkflowSpec {
        sequence: vec![
            WorkflowRole::new("coder", RoleType::Implementer),
            WorkflowRole::new("qa", RoleType::Gatekeeper),
            WorkflowRole::new("release-qa", RoleType::Gatekeeper),
        ],
        ..WorkflowSpec::standard()
    };
    let mut session = session_with(spec);
    session.start_task("t").unwrap();
    session.submit(implementation(&["a.rs"])).unwrap();

    session.submit(rejection("broken", &[])).unwrap();
    session.submit(implementation(&["a.rs"])).unwrap();
    assert_eq!(session.task().unwrap().coder_failures, 1);

    session.submit(approval()).unwrap();
    assert_eq!(session.task().unwrap().coder_failures, 0);
}

#[test]
fn third_consecutive_failure_offers_a_rebound() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);

    session
        .submit(rejection("Wrong approach to locking", &[]))
        .unwrap();
    session.submit(implementation(&["src/a.rs"])).unwrap();
    session
        .submit(rejection("Still the wrong locking approach", &[]))
        .unwrap();
    session.submit(implementation(&["src/a.rs"])).unwrap();

    let outcome = session
        .submit(rejection("Locking remains broken", &["deadlocks under load"]))
        .unwrap();
    let SubmitOutcome::ReboundOffer(offer) = outcome else {
        panic!("expected rebound offer");
    };
    assert_eq!(offer.failures, 3);
    assert_eq!(offer.last_rejection, "Locking remains broken");
    assert_eq!(
        offer.pattern.as_deref(),
        Some("Repeated issue with: locking")
    );
    assert_eq!(session.task().unwrap().state, TaskState::ReboundOffered);
}

#[test]
fn accepted_rebound_routes_to_the_designer_with_failure_context() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);
    for _ in 0..2 {
        session.submit(rejection("broken cache layer", &[])).unwrap();
        session.submit(implementation(&["src/a.rs"])).unwrap();
    }
    session
        .submit(rejection("cache layer still broken", &[]))
        .unwrap();
    assert_eq!(session.task().unwrap().state, TaskState::ReboundOffered);

    let outcome = session.resume("YES").unwrap();
    let SubmitOutcome::Assignment(a) = outcome else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "architect");
    match a.briefing {
        Briefing::Design {
            failure_context: Some(ctx),
            ..
        } => {
            assert!(ctx.contains("Iteration 1: broken cache layer"));
            assert!(ctx.contains("Iteration 3: cache layer still broken"));
        }
        other => panic!("unexpected briefing: {other:?}"),
    }

    let task = session.task().unwrap();
    assert_eq!(task.state, TaskState::InProgress);
    assert_eq!(task.coder_failures, 0);
}

#[test]
fn declined_rebound_returns_to_the_implementer_without_reset() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);
    for _ in 0..2 {
        session.submit(rejection("broken", &[])).unwrap();
        session.submit(implementation(&["src/a.rs"])).unwrap();
    }
    session.submit(rejection("still broken", &[])).unwrap();

    let outcome = session.resume("no, keep going").unwrap();
    let SubmitOutcome::Assignment(a) = outcome else {
        panic!("expected assignment");
    };
    assert_eq!(a.role, "coder");
    match a.briefing {
        Briefing::Implementation {
            feedback: Some(fb), ..
        } => assert_eq!(fb, "still broken"),
        other => panic!("unexpected briefing: {other:?}"),
    }
    // Declining keeps the streak; the trigger is exact equality, so the
    // counter moving past the threshold must not re-offer.
    assert_eq!(session.task().unwrap().coder_failures, 3);

    session.submit(implementation(&["src/a.rs"])).unwrap();
    let outcome = session.submit(rejection("broken again", &[])).unwrap();
    assert!(matches!(outcome, SubmitOutcome::Assignment(_)));
    assert_eq!(session.task().unwrap().coder_failures, 4);
}

#[test]
fn exhausted_iteration_budget_escalates() {
    let spec = WorkflowSpec {
        max_iterations: 2,
        rebound_after_failures: 10,
        ..WorkflowSpec::standard()
    };
    let mut session = session_with(spec);
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);

    session.submit(rejection("attempt one failed", &[])).unwrap();
    session.submit(implementation(&["src/a.rs"])).unwrap();
    let outcome = session.submit(rejection("attempt two failed", &[])).unwrap();

    let SubmitOutcome::Escalated(escalate) = outcome else {
        panic!("expected escalation");
    };
    assert_eq!(
        escalate.reason,
        "Maximum iterations reached without resolution"
    );
    assert_eq!(escalate.iterations, 3);
    assert_eq!(escalate.last_feedback, "attempt two failed");
    assert_eq!(
        escalate.suggestion,
        "Consider simplifying the task or manually reviewing the implementation"
    );
    assert_eq!(session.task().unwrap().state, TaskState::Escalated);

    // Terminal tasks take no further submissions.
    let err = session.submit(implementation(&["src/a.rs"])).unwrap_err();
    assert!(matches!(err, WorkflowError::NoActiveTask));
}

#[test]
fn fail_policy_reports_outright_failure() {
    let spec = WorkflowSpec {
        max_iterations: 1,
        rebound_after_failures: 10,
        on_max_iterations: OnMaxIterations::Fail,
        ..WorkflowSpec::standard()
    };
    let mut session = session_with(spec);
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);

    let outcome = session.submit(rejection("no good", &[])).unwrap();
    let SubmitOutcome::Escalated(escalate) = outcome else {
        panic!("expected escalation");
    };
    assert_eq!(escalate.reason, "Maximum iterations reached; task failed");
    assert_eq!(session.task().unwrap().state, TaskState::Escalated);
}

#[test]
fn resume_requires_a_suspended_state() {
    let mut session = standard_session();
    assert!(matches!(
        session.resume("hello").unwrap_err(),
        WorkflowError::NoActiveTask
    ));

    session.start_task("t").unwrap();
    assert!(matches!(
        session.resume("hello").unwrap_err(),
        WorkflowError::InvalidResumeState {
            state: TaskState::InProgress
        }
    ));
}

#[test]
fn resume_after_completion_fails() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);
    session.submit(approval()).unwrap();
    assert_eq!(session.task().unwrap().state, TaskState::Complete);

    assert!(matches!(
        session.resume("more work").unwrap_err(),
        WorkflowError::InvalidResumeState {
            state: TaskState::Complete
        }
    ));
}

#[test]
fn abort_lands_in_the_ledger_and_blocks_further_work() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);

    session.abort(None);
    let task = session.task().unwrap();
    assert_eq!(task.state, TaskState::Aborted);
    let entry = task.submissions.last().unwrap();
    assert_eq!(entry.role, "qa");
    assert_eq!(entry.outcome, Some(Outcome::Aborted));
    assert_eq!(entry.data.reason(), Some("Aborted by user"));

    let err = session.submit(approval()).unwrap_err();
    assert!(matches!(err, WorkflowError::NoActiveTask));
}

#[test]
fn status_projects_the_current_task() {
    let mut session = standard_session();
    let status = session.status();
    assert_eq!(status.state, TaskState::NotStarted);

    session.start_task("Add rate limiting").unwrap();
    session.submit(requirements()).unwrap();
    let status = session.status();
    assert_eq!(status.state, TaskState::InProgress);
    assert_eq!(status.current_role.as_deref(), Some("architect"));
    assert_eq!(status.iteration, 1);
    assert_eq!(status.history.len(), 1);
    assert!(status.confirmed_requirements.is_some());
    assert!(status.current_design.is_none());
}

#[test]
fn history_filters_by_role_and_iteration() {
    let mut session = standard_session();
    drive_to_gatekeeper(&mut session, &["src/a.rs"]);
    session.submit(rejection("broken", &[])).unwrap();
    session.submit(implementation(&["src/a.rs"])).unwrap();
    session.submit(approval()).unwrap();

    assert_eq!(session.history(None, None).len(), 6);
    assert_eq!(session.history(Some("qa"), None).len(), 2);
    assert_eq!(session.history(Some("coder"), Some(2)).len(), 1);
    assert_eq!(session.history(Some("ghost"), None).len(), 0);

    let qa_first = &session.history(Some("qa"), Some(1))[0];
    assert_eq!(qa_first.outcome, Some(Outcome::Rejected));
}

#[test]
fn history_is_empty_without_a_task() {
    let session = standard_session();
    assert!(session.history(None, None).is_empty());
}
