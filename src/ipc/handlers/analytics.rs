use crate::calc::{self, CalcError};
use crate::config::GradingConfig;
use crate::distribution::{analyze, DistributionSummary};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::handlers::students::class_student_ids;
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, SubmissionStatus};
use crate::store::GradebookStore;
use rusqlite::Connection;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Assignment,
    Class,
    Subject,
    GradeLevel,
    School,
}

impl Scope {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "assignment" => Some(Scope::Assignment),
            "class" => Some(Scope::Class),
            "subject" => Some(Scope::Subject),
            "gradeLevel" => Some(Scope::GradeLevel),
            "school" => Some(Scope::School),
            _ => None,
        }
    }
}

fn distribution_json(d: Option<&DistributionSummary>) -> serde_json::Value {
    match d {
        None => json!(null),
        Some(d) => {
            let mut v = json!(d);
            v["passingPercentage"] = json!(d.passing_percentage());
            v["isHealthy"] = json!(d.is_healthy());
            v
        }
    }
}

fn load_assignment(conn: &Connection, assignment_id: &str) -> Result<Assignment, CalcError> {
    conn.get_assignment(assignment_id)?
        .ok_or_else(|| CalcError::not_found("assignment"))
}

fn class_summary(
    conn: &Connection,
    class_id: &str,
    cfg: &GradingConfig,
) -> Result<calc::ClassSummary, CalcError> {
    let assignments = conn.list_assignments(class_id)?;
    let submissions = conn.list_class_submissions(class_id)?;
    let student_ids =
        class_student_ids(conn, class_id).map_err(|e| CalcError::Storage(e.to_string()))?;
    calc::compute_class_summary(class_id, &assignments, &submissions, &student_ids, cfg)
}

fn class_ids_where(
    conn: &Connection,
    sql: &str,
    param: Option<rusqlite::types::Value>,
) -> Result<Vec<String>, CalcError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| CalcError::Storage(e.to_string()))?;
    let rows = match param {
        Some(p) => stmt
            .query_map([p], |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    };
    rows.map_err(|e| CalcError::Storage(e.to_string()))
}

/// Zero-point assignments (participation, notes) have no meaningful spread.
fn graded_distribution(
    assignment: &Assignment,
    scores: &[f64],
) -> Result<Option<DistributionSummary>, CalcError> {
    if assignment.total_points <= 0.0 {
        return Ok(None);
    }
    analyze(scores, assignment.total_points)
}

/// One data point per (class, student) final mark across the listed classes.
fn finals_for_classes(
    conn: &Connection,
    class_ids: &[String],
    cfg: &GradingConfig,
) -> Result<Vec<f64>, CalcError> {
    let mut out = Vec::new();
    for cid in class_ids {
        let summary = class_summary(conn, cid, cfg)?;
        out.extend(summary.per_student.iter().filter_map(|s| s.final_percent));
    }
    Ok(out)
}

fn handle_assignment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = (|| -> Result<serde_json::Value, CalcError> {
        let assignment = load_assignment(conn, &assignment_id)?;
        let submissions = conn.list_submissions(&assignment_id)?;
        let stats = calc::compute_assignment_stats(&assignment, &submissions, &state.config)?;
        let scores: Vec<f64> = submissions
            .iter()
            .filter(|s| s.status == SubmissionStatus::Graded)
            .filter_map(|s| s.score)
            .collect();
        let dist = graded_distribution(&assignment, &scores)?;
        Ok(json!({
            "stats": stats,
            "distribution": distribution_json(dist.as_ref()),
        }))
    })();
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match class_summary(conn, &class_id, &state.config) {
        Ok(summary) => {
            let dist = distribution_json(summary.distribution.as_ref());
            let mut v = json!(summary);
            v["distribution"] = dist;
            ok(&req.id, v)
        }
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_distribution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope_raw = match required_str(req, "scope") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(scope) = Scope::parse(&scope_raw) else {
        return err(
            &req.id,
            "bad_params",
            "scope must be one of assignment, class, subject, gradeLevel, school",
            Some(json!({ "scope": scope_raw })),
        );
    };
    let cfg = state.config;

    let result = match scope {
        Scope::Assignment => {
            let assignment_id = match required_str(req, "assignmentId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            (|| -> Result<Option<DistributionSummary>, CalcError> {
                let assignment = load_assignment(conn, &assignment_id)?;
                let scores: Vec<f64> = conn
                    .list_submissions(&assignment_id)?
                    .iter()
                    .filter(|s| s.status == SubmissionStatus::Graded)
                    .filter_map(|s| s.score)
                    .collect();
                graded_distribution(&assignment, &scores)
            })()
        }
        Scope::Class => {
            let class_id = match required_str(req, "classId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            class_summary(conn, &class_id, &cfg).map(|s| s.distribution)
        }
        Scope::Subject => {
            let subject = match required_str(req, "subject") {
                Ok(v) => v,
                Err(e) => return e,
            };
            class_ids_where(
                conn,
                "SELECT id FROM classes WHERE lower(subject) = lower(?) ORDER BY name",
                Some(rusqlite::types::Value::Text(subject)),
            )
            .and_then(|ids| finals_for_classes(conn, &ids, &cfg))
            .and_then(|finals| analyze(&finals, 100.0))
        }
        Scope::GradeLevel => {
            let Some(level) = req.params.get("gradeLevel").and_then(|v| v.as_i64()) else {
                return err(&req.id, "bad_params", "missing integer gradeLevel", None);
            };
            class_ids_where(
                conn,
                "SELECT id FROM classes WHERE grade_level = ? ORDER BY name",
                Some(rusqlite::types::Value::Integer(level)),
            )
            .and_then(|ids| finals_for_classes(conn, &ids, &cfg))
            .and_then(|finals| analyze(&finals, 100.0))
        }
        Scope::School => class_ids_where(conn, "SELECT id FROM classes ORDER BY name", None)
            .and_then(|ids| finals_for_classes(conn, &ids, &cfg))
            .and_then(|finals| analyze(&finals, 100.0)),
    };

    match result {
        Ok(d) => ok(
            &req.id,
            json!({
                "scope": scope_raw,
                "distribution": distribution_json(d.as_ref()),
            }),
        ),
        Err(e) => calc_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.assignment" => Some(handle_assignment(state, req)),
        "analytics.class" => Some(handle_class(state, req)),
        "analytics.distribution" => Some(handle_distribution(state, req)),
        _ => None,
    }
}
