//! Submission status transitions.
//!
//! Every grading operation checks its transition table before touching the
//! record. A caller may force an illegal transition with `force = true`; the
//! override is logged so silent overwrites (re-grading an excused student,
//! for instance) stay visible.

use crate::calc::CalcError;
use crate::model::{Assignment, Submission, SubmissionStatus};
use chrono::{DateTime, Utc};

use SubmissionStatus::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SaveDraft,
    Submit,
    Grade,
    Excuse,
    ReturnForRevision,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::SaveDraft => "save a draft of",
            Action::Submit => "submit",
            Action::Grade => "grade",
            Action::Excuse => "excuse",
            Action::ReturnForRevision => "return",
        }
    }

    pub fn target(self) -> SubmissionStatus {
        match self {
            Action::SaveDraft => Draft,
            Action::Submit => Submitted,
            Action::Grade => Graded,
            Action::Excuse => Excused,
            Action::ReturnForRevision => ReturnedForRevision,
        }
    }

    pub fn allowed_from(self) -> &'static [SubmissionStatus] {
        match self {
            Action::SaveDraft => &[NotSubmitted, Draft, ReturnedForRevision],
            Action::Submit => &[
                NotSubmitted,
                Draft,
                Submitted,
                Late,
                Resubmitted,
                ReturnedForRevision,
            ],
            // Graded -> Graded is a re-grade and overwrites the previous result.
            Action::Grade => &[Submitted, Late, Resubmitted, Graded],
            Action::Excuse => &[
                NotSubmitted,
                Draft,
                Submitted,
                Late,
                Resubmitted,
                ReturnedForRevision,
            ],
            Action::ReturnForRevision => &[Submitted, Late, Resubmitted, Graded],
        }
    }
}

pub fn can_transition(from: SubmissionStatus, action: Action) -> bool {
    action.allowed_from().contains(&from)
}

pub fn check_transition(sub: &Submission, action: Action, force: bool) -> Result<(), CalcError> {
    if can_transition(sub.status, action) {
        return Ok(());
    }
    if force {
        tracing::warn!(
            submission = %sub.id,
            from = sub.status.as_str(),
            to = action.target().as_str(),
            "forcing illegal submission transition"
        );
        return Ok(());
    }
    Err(CalcError::IllegalTransition {
        from: sub.status,
        action: action.as_str(),
    })
}

fn required_grader(grader_id: &str) -> Result<String, CalcError> {
    let g = grader_id.trim();
    if g.is_empty() {
        return Err(CalcError::invalid("graderId must not be empty"));
    }
    Ok(g.to_string())
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn save_draft(sub: &mut Submission, force: bool) -> Result<(), CalcError> {
    check_transition(sub, Action::SaveDraft, force)?;
    sub.status = Draft;
    sub.is_draft = true;
    Ok(())
}

pub fn submit(sub: &mut Submission, now: DateTime<Utc>, force: bool) -> Result<(), CalcError> {
    check_transition(sub, Action::Submit, force)?;
    sub.status = Submitted;
    sub.submitted_at = Some(now);
    sub.attempt_count += 1;
    sub.is_draft = false;
    Ok(())
}

pub fn grade(
    sub: &mut Submission,
    score: f64,
    feedback: Option<&str>,
    grader_id: &str,
    now: DateTime<Utc>,
    force: bool,
) -> Result<(), CalcError> {
    check_transition(sub, Action::Grade, force)?;
    if !score.is_finite() || score < 0.0 {
        return Err(CalcError::invalid("score must be a non-negative number"));
    }
    let grader = required_grader(grader_id)?;
    sub.status = Graded;
    sub.score = Some(score);
    sub.feedback = non_empty(feedback);
    sub.grader_id = Some(grader);
    sub.graded_at = Some(now);
    Ok(())
}

pub fn grade_with_rubric(
    sub: &mut Submission,
    rubric_score_id: &str,
    score: f64,
    feedback: Option<&str>,
    grader_id: &str,
    now: DateTime<Utc>,
    force: bool,
) -> Result<(), CalcError> {
    let previous = sub.rubric_score_id.replace(rubric_score_id.to_string());
    if let Err(e) = grade(sub, score, feedback, grader_id, now, force) {
        sub.rubric_score_id = previous;
        return Err(e);
    }
    Ok(())
}

pub fn mark_as_excused(
    sub: &mut Submission,
    grader_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
    force: bool,
) -> Result<(), CalcError> {
    check_transition(sub, Action::Excuse, force)?;
    let grader = required_grader(grader_id)?;
    sub.status = Excused;
    sub.feedback = non_empty(reason);
    sub.grader_id = Some(grader);
    sub.graded_at = Some(now);
    Ok(())
}

pub fn return_for_revision(
    sub: &mut Submission,
    feedback: Option<&str>,
    grader_id: &str,
    now: DateTime<Utc>,
    force: bool,
) -> Result<(), CalcError> {
    check_transition(sub, Action::ReturnForRevision, force)?;
    let grader = required_grader(grader_id)?;
    sub.status = ReturnedForRevision;
    sub.feedback = non_empty(feedback);
    sub.grader_id = Some(grader);
    sub.graded_at = Some(now);
    Ok(())
}

pub fn request_feedback(sub: &mut Submission) {
    sub.feedback_requested = true;
}

/// Unchecked status write. Callers gate this behind the override policy.
pub fn force_status(sub: &mut Submission, status: SubmissionStatus) {
    tracing::warn!(
        submission = %sub.id,
        from = sub.status.as_str(),
        to = status.as_str(),
        "status set directly"
    );
    sub.status = status;
    sub.is_draft = status == Draft;
}

pub fn is_late(sub: &Submission, assignment: &Assignment) -> bool {
    match (sub.submitted_at, assignment.due_date) {
        (Some(submitted), Some(due)) => submitted > due,
        _ => false,
    }
}

pub fn score_percentage(sub: &Submission, total_points: f64) -> f64 {
    if total_points <= 0.0 {
        return 0.0;
    }
    sub.score.unwrap_or(0.0) / total_points * 100.0
}

/// Percentage that counts toward averages: graded with a score, otherwise `None`.
pub fn counted_percentage(sub: &Submission, assignment: &Assignment) -> Option<f64> {
    if sub.status != Graded {
        return None;
    }
    sub.score?;
    Some(score_percentage(sub, assignment.total_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().expect("valid time")
    }

    fn sub() -> Submission {
        Submission::new("s1".into(), "a1".into(), "st1".into())
    }

    fn assignment(due: Option<DateTime<Utc>>) -> Assignment {
        Assignment {
            id: "a1".into(),
            class_id: "c1".into(),
            title: "Essay".into(),
            category: None,
            total_points: 40.0,
            weight: 1.0,
            due_date: due,
            rubric_id: None,
        }
    }

    #[test]
    fn submit_then_grade() {
        let mut s = sub();
        save_draft(&mut s, false).expect("draft");
        assert!(s.is_draft);
        submit(&mut s, now(), false).expect("submit");
        assert_eq!(s.status, Submitted);
        assert_eq!(s.attempt_count, 1);
        assert!(!s.is_draft);
        assert_eq!(s.submitted_at, Some(now()));

        grade(&mut s, 30.0, Some(" Good work "), "t1", now(), false).expect("grade");
        assert_eq!(s.status, Graded);
        assert_eq!(s.score, Some(30.0));
        assert_eq!(s.feedback.as_deref(), Some("Good work"));
        assert_eq!(s.grader_id.as_deref(), Some("t1"));
        assert_eq!(score_percentage(&s, 40.0), 75.0);
    }

    #[test]
    fn regrade_overwrites() {
        let mut s = sub();
        submit(&mut s, now(), false).expect("submit");
        grade(&mut s, 10.0, None, "t1", now(), false).expect("grade");
        grade(&mut s, 20.0, None, "t2", now(), false).expect("regrade");
        assert_eq!(s.score, Some(20.0));
        assert_eq!(s.grader_id.as_deref(), Some("t2"));
    }

    #[test]
    fn grading_excused_requires_override() {
        let mut s = sub();
        mark_as_excused(&mut s, "t1", Some("medical"), now(), false).expect("excuse");
        assert_eq!(s.feedback.as_deref(), Some("medical"));

        let e = grade(&mut s, 10.0, None, "t1", now(), false).expect_err("illegal");
        assert_eq!(e.code(), "illegal_transition");
        assert_eq!(s.status, Excused);

        grade(&mut s, 10.0, None, "t1", now(), true).expect("forced");
        assert_eq!(s.status, Graded);
    }

    #[test]
    fn cannot_grade_before_submission() {
        let mut s = sub();
        assert!(grade(&mut s, 10.0, None, "t1", now(), false).is_err());
        assert_eq!(s.score, None);
    }

    #[test]
    fn return_and_resubmit_counts_attempts() {
        let mut s = sub();
        submit(&mut s, now(), false).expect("submit");
        return_for_revision(&mut s, Some("cite sources"), "t1", now(), false).expect("return");
        assert_eq!(s.status, ReturnedForRevision);
        submit(&mut s, now() + Duration::days(1), false).expect("resubmit");
        assert_eq!(s.attempt_count, 2);
        assert_eq!(s.status, Submitted);
    }

    #[test]
    fn rubric_grading_sets_reference_only_on_success() {
        let mut s = sub();
        assert!(grade_with_rubric(&mut s, "rs1", 10.0, None, "t1", now(), false).is_err());
        assert_eq!(s.rubric_score_id, None);

        submit(&mut s, now(), false).expect("submit");
        assert!(grade_with_rubric(&mut s, "rs1", 10.0, None, " ", now(), false).is_err());
        assert_eq!(s.rubric_score_id, None);

        grade_with_rubric(&mut s, "rs1", 10.0, None, "t1", now(), false).expect("grade");
        assert_eq!(s.rubric_score_id.as_deref(), Some("rs1"));
        assert_eq!(s.status, Graded);
    }

    #[test]
    fn forced_rubric_grade_skips_submission_and_failed_regrade_keeps_reference() {
        let mut s = sub();
        assert!(matches!(
            grade_with_rubric(&mut s, "rs1", 8.0, None, "t1", now(), false),
            Err(CalcError::IllegalTransition { .. })
        ));
        grade_with_rubric(&mut s, "rs1", 8.0, None, "t1", now(), true).expect("forced");
        assert_eq!(s.status, Graded);
        assert_eq!(s.rubric_score_id.as_deref(), Some("rs1"));

        assert!(grade_with_rubric(&mut s, "rs2", -1.0, None, "t1", now(), false).is_err());
        assert_eq!(s.rubric_score_id.as_deref(), Some("rs1"));
        assert_eq!(s.score, Some(8.0));
    }

    #[test]
    fn request_feedback_keeps_status() {
        let mut s = sub();
        submit(&mut s, now(), false).expect("submit");
        request_feedback(&mut s);
        assert!(s.feedback_requested);
        assert_eq!(s.status, Submitted);
    }

    #[test]
    fn late_needs_a_submission_date() {
        let due = now();
        let a = assignment(Some(due));
        let mut s = sub();
        assert!(!is_late(&s, &a));
        submit(&mut s, due + Duration::minutes(1), false).expect("submit");
        assert!(is_late(&s, &a));
        assert!(!is_late(&s, &assignment(None)));

        let mut on_time = sub();
        submit(&mut on_time, due, false).expect("submit");
        assert!(!is_late(&on_time, &a));
    }

    #[test]
    fn negative_score_rejected_and_zero_total_guarded() {
        let mut s = sub();
        submit(&mut s, now(), false).expect("submit");
        assert!(grade(&mut s, -1.0, None, "t1", now(), false).is_err());
        s.score = Some(5.0);
        assert_eq!(score_percentage(&s, 0.0), 0.0);
    }

    #[test]
    fn transition_table_is_closed() {
        for from in SubmissionStatus::ALL {
            assert_eq!(can_transition(from, Action::Grade), matches!(from, Submitted | Late | Resubmitted | Graded));
        }
        assert!(!can_transition(Graded, Action::Excuse));
        assert!(!can_transition(Excused, Action::Submit));
    }
}
