use crate::bucket::letter_grade_on_scale;
use crate::config::GradingConfig;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::handlers::rubrics::{check_rubric_scale, parse_comments, parse_selections};
use crate::ipc::helpers::{
    db_conn, db_err, optional_str, override_flag, request_now, required_f64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, Submission, SubmissionStatus};
use crate::rubric;
use crate::store::GradebookStore;
use crate::submission::{self as grading, is_late, score_percentage};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn is_enrolled(conn: &Connection, class_id: &str, student_id: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE class_id = ? AND student_id = ?",
            (class_id, student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Resolves `submissionId`, or `assignmentId` + `studentId`. A student with no
/// record yet gets a fresh not-submitted one (unsaved until the caller saves it).
fn load_target(conn: &Connection, req: &Request) -> Result<(Assignment, Submission), serde_json::Value> {
    if let Some(sid) = optional_str(req, "submissionId")? {
        let sub = match conn.get_submission(&sid) {
            Ok(Some(s)) => s,
            Ok(None) => return Err(err(&req.id, "not_found", "submission not found", None)),
            Err(e) => return Err(db_err(req, format!("{e:#}"))),
        };
        let assignment = match conn.get_assignment(&sub.assignment_id) {
            Ok(Some(a)) => a,
            Ok(None) => return Err(err(&req.id, "not_found", "assignment not found", None)),
            Err(e) => return Err(db_err(req, format!("{e:#}"))),
        };
        return Ok((assignment, sub));
    }

    let assignment_id = required_str(req, "assignmentId")?;
    let student_id = required_str(req, "studentId")?;
    let assignment = match conn.get_assignment(&assignment_id) {
        Ok(Some(a)) => a,
        Ok(None) => return Err(err(&req.id, "not_found", "assignment not found", None)),
        Err(e) => return Err(db_err(req, format!("{e:#}"))),
    };
    match conn.find_submission(&assignment_id, &student_id) {
        Ok(Some(s)) => Ok((assignment, s)),
        Ok(None) => match is_enrolled(conn, &assignment.class_id, &student_id) {
            Ok(true) => Ok((
                assignment,
                Submission::new(Uuid::new_v4().to_string(), assignment_id, student_id),
            )),
            Ok(false) => Err(err(
                &req.id,
                "not_found",
                "student is not enrolled in this assignment's class",
                Some(json!({ "studentId": student_id })),
            )),
            Err(e) => Err(db_err(req, e)),
        },
        Err(e) => Err(db_err(req, format!("{e:#}"))),
    }
}

fn submission_json(sub: &Submission, assignment: &Assignment, cfg: &GradingConfig) -> serde_json::Value {
    let percent = sub.score.map(|_| score_percentage(sub, assignment.total_points));
    let letter = percent.and_then(|p| letter_grade_on_scale(p, cfg.letter_scale).ok());
    json!({
        "submission": sub,
        "isLate": is_late(sub, assignment),
        "scorePercentage": percent,
        "letter": letter,
    })
}

fn save_and_respond(
    conn: &Connection,
    req: &Request,
    cfg: &GradingConfig,
    assignment: &Assignment,
    sub: &Submission,
) -> serde_json::Value {
    if let Err(e) = conn.save_submission(sub) {
        return db_err(req, format!("{e:#}"));
    }
    ok(&req.id, submission_json(sub, assignment, cfg))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (assignment, sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rubric_score = match &sub.rubric_score_id {
        Some(id) => match conn.get_rubric_score(id) {
            Ok(v) => v,
            Err(e) => return db_err(req, format!("{e:#}")),
        },
        None => None,
    };
    let mut out = submission_json(&sub, &assignment, &state.config);
    out["rubricScore"] = json!(rubric_score);
    ok(&req.id, out)
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment = match conn.get_assignment(&assignment_id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "assignment not found", None),
        Err(e) => return db_err(req, format!("{e:#}")),
    };
    let subs = match conn.list_submissions(&assignment_id) {
        Ok(v) => v,
        Err(e) => return db_err(req, format!("{e:#}")),
    };
    let rows: Vec<serde_json::Value> = subs
        .iter()
        .map(|s| submission_json(s, &assignment, &state.config))
        .collect();
    ok(&req.id, json!({ "submissions": rows }))
}

fn handle_save_draft(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = grading::save_draft(&mut sub, force) {
        return calc_err(&req.id, &e);
    }
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = grading::submit(&mut sub, now, force) {
        return calc_err(&req.id, &e);
    }
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

fn handle_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match required_f64(req, "score") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grader_id = match required_str(req, "graderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let feedback = match optional_str(req, "feedback") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = grading::grade(&mut sub, score, feedback.as_deref(), &grader_id, now, force) {
        return calc_err(&req.id, &e);
    }
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

fn handle_grade_with_rubric(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grader_id = match required_str(req, "graderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let feedback = match optional_str(req, "feedback") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let selections = match parse_selections(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let comments = match parse_comments(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(rubric_id) = assignment.rubric_id.as_deref() else {
        return err(&req.id, "bad_params", "assignment has no rubric", None);
    };
    let rubric = match conn.get_rubric(rubric_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "rubric not found", None),
        Err(e) => return db_err(req, format!("{e:#}")),
    };
    if let Err(e) = check_rubric_scale(req, &rubric, assignment.total_points) {
        return e;
    }

    // Re-grading overwrites the previous rubric score in place.
    let rubric_score_id = sub
        .rubric_score_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let rubric_score = match rubric::build_rubric_score(
        rubric_score_id,
        &rubric,
        &sub.id,
        &selections,
        &comments,
        now,
    ) {
        Ok(rs) => rs,
        Err(e) => return calc_err(&req.id, &e),
    };
    if let Err(e) = grading::grade_with_rubric(
        &mut sub,
        &rubric_score.id,
        rubric_score.total as f64,
        feedback.as_deref(),
        &grader_id,
        now,
        force,
    ) {
        return calc_err(&req.id, &e);
    }

    if let Err(e) = conn.save_rubric_grade(&sub, &rubric_score) {
        return db_err(req, format!("{e:#}"));
    }
    let letter = letter_grade_on_scale(
        score_percentage(&sub, assignment.total_points),
        state.config.letter_scale,
    )
    .map_or("-", |l| l.as_str());
    tracing::debug!(
        submission = %sub.id,
        rubric = %rubric.id,
        total = rubric_score.total,
        letter,
        "rubric grade saved"
    );
    let mut out = submission_json(&sub, &assignment, &state.config);
    out["rubricScore"] = json!(rubric_score);
    ok(&req.id, out)
}

fn handle_excuse(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grader_id = match required_str(req, "graderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reason = match optional_str(req, "reason") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = grading::mark_as_excused(&mut sub, &grader_id, reason.as_deref(), now, force) {
        return calc_err(&req.id, &e);
    }
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

fn handle_return_for_revision(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grader_id = match required_str(req, "graderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let feedback = match optional_str(req, "feedback") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) =
        grading::return_for_revision(&mut sub, feedback.as_deref(), &grader_id, now, force)
    {
        return calc_err(&req.id, &e);
    }
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

fn handle_request_feedback(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    grading::request_feedback(&mut sub);
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

fn handle_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let force = match override_flag(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !force {
        return err(
            &req.id,
            "bad_params",
            "submissions.setStatus requires override: true",
            None,
        );
    }
    let status = match required_str(req, "status") {
        Ok(raw) => match SubmissionStatus::parse(&raw) {
            Some(s) => s,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown status",
                    Some(json!({ "status": raw })),
                )
            }
        },
        Err(e) => return e,
    };
    let (assignment, mut sub) = match load_target(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    grading::force_status(&mut sub, status);
    save_and_respond(conn, req, &state.config, &assignment, &sub)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.get" => Some(handle_get(state, req)),
        "submissions.list" => Some(handle_list(state, req)),
        "submissions.saveDraft" => Some(handle_save_draft(state, req)),
        "submissions.submit" => Some(handle_submit(state, req)),
        "submissions.grade" => Some(handle_grade(state, req)),
        "submissions.gradeWithRubric" => Some(handle_grade_with_rubric(state, req)),
        "submissions.excuse" => Some(handle_excuse(state, req)),
        "submissions.returnForRevision" => Some(handle_return_for_revision(state, req)),
        "submissions.requestFeedback" => Some(handle_request_feedback(state, req)),
        "submissions.setStatus" => Some(handle_set_status(state, req)),
        _ => None,
    }
}
