use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT,
            grade_level INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            grade_level INTEGER,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubrics(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            total_points INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_criteria(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            name TEXT NOT NULL,
            points INTEGER NOT NULL,
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rubric_criteria_rubric ON rubric_criteria(rubric_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_levels(
            criterion_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            description TEXT NOT NULL,
            percent INTEGER NOT NULL,
            PRIMARY KEY(criterion_id, level),
            FOREIGN KEY(criterion_id) REFERENCES rubric_criteria(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            title TEXT NOT NULL,
            category TEXT,
            total_points REAL NOT NULL,
            weight REAL NOT NULL DEFAULT 1,
            due_date TEXT,
            rubric_id TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            submitted_at TEXT,
            score REAL,
            feedback TEXT,
            graded_at TEXT,
            grader_id TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            is_draft INTEGER NOT NULL DEFAULT 0,
            feedback_requested INTEGER NOT NULL DEFAULT 0,
            rubric_score_id TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    // One submission per student per assignment.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_submissions_assignment_student
         ON submissions(assignment_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_scores(
            id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL,
            rubric_id TEXT NOT NULL,
            total INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(submission_id) REFERENCES submissions(id),
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS criterion_scores(
            rubric_score_id TEXT NOT NULL,
            criterion_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            level INTEGER,
            score INTEGER NOT NULL,
            comment TEXT,
            PRIMARY KEY(rubric_score_id, criterion_id),
            FOREIGN KEY(rubric_score_id) REFERENCES rubric_scores(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    ensure_submissions_feedback_requested(&conn)?;

    Ok(conn)
}

// Workspaces created before feedback requests were tracked lack the column.
fn ensure_submissions_feedback_requested(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "submissions", "feedback_requested")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE submissions ADD COLUMN feedback_requested INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
