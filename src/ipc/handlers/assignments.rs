use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, db_err, optional_f64, optional_str, optional_timestamp, required_f64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::ipc::handlers::rubrics::check_rubric_scale;
use crate::model::{Assignment, Rubric};
use crate::rubric::duplicate_rubric;
use crate::store::GradebookStore;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn class_exists(conn: &Connection, class_id: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn rubric_in_use(conn: &Connection, rubric_id: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM assignments WHERE rubric_id = ? LIMIT 1",
            [rubric_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Rubrics belong to exactly one assignment. Attaching one that is already
/// owned attaches a fresh copy instead.
fn claim_rubric(conn: &Connection, rubric: &Rubric) -> anyhow::Result<String> {
    if !rubric_in_use(conn, &rubric.id)? {
        return Ok(rubric.id.clone());
    }
    let copy = duplicate_rubric(rubric, new_id);
    conn.save_rubric(&copy)?;
    tracing::debug!(source = %rubric.id, copy = %copy.id, "rubric already attached; copied");
    Ok(copy.id)
}

fn assignment_json(conn: &Connection, a: &Assignment) -> anyhow::Result<serde_json::Value> {
    let rubric = match &a.rubric_id {
        Some(id) => conn.get_rubric(id)?,
        None => None,
    };
    Ok(json!({ "assignment": a, "rubric": rubric }))
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category = match optional_str(req, "category") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let total_points = match required_f64(req, "totalPoints") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !total_points.is_finite() || total_points < 0.0 {
        return err(&req.id, "bad_params", "totalPoints must not be negative", None);
    }
    let weight = match optional_f64(req, "weight") {
        Ok(v) => v.unwrap_or(1.0),
        Err(e) => return e,
    };
    if !weight.is_finite() || weight < 0.0 {
        return err(&req.id, "bad_params", "weight must not be negative", None);
    }
    let due_date = match optional_timestamp(req, "dueDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rubric_id = match optional_str(req, "rubricId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return db_err(req, e),
    }
    let rubric_id = match rubric_id {
        None => None,
        Some(rid) => {
            let rubric = match conn.get_rubric(&rid) {
                Ok(Some(r)) => r,
                Ok(None) => return err(&req.id, "not_found", "rubric not found", None),
                Err(e) => return db_err(req, format!("{e:#}")),
            };
            if let Err(e) = check_rubric_scale(req, &rubric, total_points) {
                return e;
            }
            match claim_rubric(conn, &rubric) {
                Ok(id) => Some(id),
                Err(e) => return db_err(req, format!("{e:#}")),
            }
        }
    };

    let assignment = Assignment {
        id: new_id(),
        class_id,
        title,
        category,
        total_points,
        weight,
        due_date,
        rubric_id,
    };
    if let Err(e) = conn.save_assignment(&assignment) {
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "assignments" })),
        );
    }
    ok(&req.id, json!({ "assignmentId": assignment.id, "assignment": assignment }))
}

fn handle_assignments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match assignment_json(conn, &assignment) {
        Ok(v) => ok(&req.id, v),
        Err(e) => db_err(req, format!("{e:#}")),
    }
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.list_assignments(&class_id) {
        Ok(list) => ok(&req.id, json!({ "assignments": list })),
        Err(e) => db_err(req, format!("{e:#}")),
    }
}

fn handle_assignments_duplicate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match optional_str(req, "title") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let source = match conn.get_assignment(&assignment_id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "assignment not found", None),
        Err(e) => return db_err(req, format!("{e:#}")),
    };

    // Copy the rubric first so the new assignment never points at the original's.
    let rubric_id = match &source.rubric_id {
        None => None,
        Some(rid) => match conn.get_rubric(rid) {
            Ok(Some(r)) => {
                let copy = duplicate_rubric(&r, new_id);
                if let Err(e) = conn.save_rubric(&copy) {
                    return db_err(req, format!("{e:#}"));
                }
                Some(copy.id)
            }
            Ok(None) => None,
            Err(e) => return db_err(req, format!("{e:#}")),
        },
    };
    let copy = Assignment {
        id: new_id(),
        title: title.unwrap_or_else(|| format!("{} (copy)", source.title)),
        rubric_id,
        ..source
    };
    if let Err(e) = conn.save_assignment(&copy) {
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "assignments" })),
        );
    }

    match assignment_json(conn, &copy) {
        Ok(mut v) => {
            v["assignmentId"] = json!(copy.id);
            ok(&req.id, v)
        }
        Err(e) => db_err(req, format!("{e:#}")),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.get" => Some(handle_assignments_get(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.duplicate" => Some(handle_assignments_duplicate(state, req)),
        _ => None,
    }
}
