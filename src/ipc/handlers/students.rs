use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn student_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let last: String = row.get(1)?;
    let first: String = row.get(2)?;
    let student_no: Option<String> = row.get(3)?;
    let grade_level: Option<i64> = row.get(4)?;
    let active: i64 = row.get(5)?;
    Ok(json!({
        "id": id,
        "lastName": last,
        "firstName": first,
        "displayName": format!("{}, {}", last, first),
        "studentNo": student_no,
        "gradeLevel": grade_level,
        "active": active != 0,
    }))
}

/// Enrolled students in roster order.
pub fn class_student_ids(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM enrollments WHERE class_id = ? ORDER BY sort_order",
    )?;
    let ids = stmt
        .query_map([class_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match optional_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let rows = match &class_id {
        Some(cid) => conn
            .prepare(
                "SELECT s.id, s.last_name, s.first_name, s.student_no, s.grade_level, s.active
                 FROM enrollments e
                 JOIN students s ON s.id = e.student_id
                 WHERE e.class_id = ?
                 ORDER BY e.sort_order",
            )
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([cid], student_json)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }),
        None => conn
            .prepare(
                "SELECT id, last_name, first_name, student_no, grade_level, active
                 FROM students
                 ORDER BY last_name, first_name",
            )
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([], student_json)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }),
    };

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => db_err(req, e),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_no = match optional_str(req, "studentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_level = match optional_i64(req, "gradeLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, last_name, first_name, student_no, grade_level, active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&student_id, &last_name, &first_name, &student_no, grade_level),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        _ => None,
    }
}
