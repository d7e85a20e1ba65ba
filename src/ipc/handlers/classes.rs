use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries so the counts don't multiply through joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.subject,
           c.grade_level,
           (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM assignments a WHERE a.class_id = c.id) AS assignment_count
         FROM classes c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, e),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let subject: Option<String> = row.get(2)?;
            let grade_level: Option<i64> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let assignment_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "subject": subject,
                "gradeLevel": grade_level,
                "studentCount": student_count,
                "assignmentCount": assignment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => db_err(req, e),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match optional_str(req, "subject") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let grade_level = match optional_i64(req, "gradeLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, subject, grade_level) VALUES(?, ?, ?, ?)",
        (&class_id, &name, &subject, grade_level),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id, "name": name }))
}

fn handle_classes_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw_ids) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing studentIds", None);
    };
    let mut student_ids = Vec::with_capacity(raw_ids.len());
    for v in raw_ids {
        match v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => student_ids.push(s.to_string()),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "studentIds must contain only non-empty strings",
                    None,
                )
            }
        }
    }

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return db_err(req, e),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut next_sort: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM enrollments WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return db_err(req, e),
    };
    let mut enrolled = 0_usize;
    for student_id in &student_ids {
        let known: Option<i64> = match tx
            .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return db_err(req, e),
        };
        if known.is_none() {
            let _ = tx.rollback();
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            );
        }
        match tx.execute(
            "INSERT OR IGNORE INTO enrollments(class_id, student_id, sort_order) VALUES(?, ?, ?)",
            (&class_id, student_id, next_sort),
        ) {
            Ok(n) if n > 0 => {
                enrolled += 1;
                next_sort += 1;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.rollback();
                return db_err(req, e);
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "classId": class_id, "enrolledCount": enrolled }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.enroll" => Some(handle_classes_enroll(state, req)),
        _ => None,
    }
}
