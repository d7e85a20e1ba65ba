use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

struct Fixture {
    workspace: PathBuf,
    assignment_id: String,
    student_id: String,
}

fn setup(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, prefix: &str) -> Fixture {
    let workspace = temp_dir(prefix);
    request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(stdin, reader, "setup-class", "classes.create", json!({ "name": "8A" }));
    let class_id = class["classId"].as_str().expect("classId").to_string();
    let student = request_ok(
        stdin,
        reader,
        "setup-student",
        "students.create",
        json!({ "lastName": "Lovelace", "firstName": "Ada" }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    request_ok(
        stdin,
        reader,
        "setup-enroll",
        "classes.enroll",
        json!({ "classId": class_id, "studentIds": [student_id] }),
    );
    let assignment = request_ok(
        stdin,
        reader,
        "setup-assignment",
        "assignments.create",
        json!({
            "classId": class_id,
            "title": "Essay",
            "totalPoints": 50,
            "dueDate": "2026-02-01"
        }),
    );
    let assignment_id = assignment["assignmentId"].as_str().expect("assignmentId").to_string();
    Fixture {
        workspace,
        assignment_id,
        student_id,
    }
}

#[test]
fn draft_submit_grade_flow_tracks_attempts_and_lateness() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, "gradebook-lifecycle");
    let target = json!({ "assignmentId": fx.assignment_id, "studentId": fx.student_id });

    let draft = request_ok(&mut stdin, &mut reader, "1", "submissions.saveDraft", target.clone());
    assert_eq!(draft["submission"]["status"], json!("draft"));
    assert_eq!(draft["submission"]["isDraft"], json!(true));
    let submission_id = draft["submission"]["id"].as_str().expect("id").to_string();

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "submissions.submit",
        json!({ "submissionId": submission_id, "now": "2026-02-03T10:00:00Z" }),
    );
    assert_eq!(submitted["submission"]["status"], json!("submitted"));
    assert_eq!(submitted["submission"]["attemptCount"], json!(1));
    assert_eq!(submitted["submission"]["isDraft"], json!(false));
    assert_eq!(submitted["isLate"], json!(true));

    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.grade",
        json!({
            "submissionId": submission_id,
            "score": 45,
            "graderId": "t-1",
            "feedback": "Strong argument."
        }),
    );
    assert_eq!(graded["submission"]["status"], json!("graded"));
    assert_eq!(graded["submission"]["graderId"], json!("t-1"));
    assert_eq!(graded["submission"]["feedback"], json!("Strong argument."));
    let pct = graded["scorePercentage"].as_f64().expect("scorePercentage");
    assert!((pct - 90.0).abs() < 1e-9, "pct={pct}");
    assert_eq!(graded["letter"], json!("A-"));

    // Re-grading a graded submission overwrites the score.
    let regraded = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.grade",
        json!({ "submissionId": submission_id, "score": 40, "graderId": "t-2" }),
    );
    assert_eq!(regraded["submission"]["score"], json!(40.0));
    assert_eq!(regraded["submission"]["graderId"], json!("t-2"));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "submissions.get",
        json!({ "submissionId": submission_id }),
    );
    assert_eq!(fetched["submission"]["score"], json!(40.0));
    assert_eq!(fetched["submission"]["attemptCount"], json!(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(fx.workspace);
}

#[test]
fn illegal_transitions_are_rejected_unless_overridden() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, "gradebook-lifecycle-illegal");
    let target = json!({ "assignmentId": fx.assignment_id, "studentId": fx.student_id });

    // Nothing to grade yet.
    let mut early = target.clone();
    early["score"] = json!(10);
    early["graderId"] = json!("t-1");
    let resp = request(&mut stdin, &mut reader, "1", "submissions.grade", early);
    assert_eq!(error_code(&resp), "illegal_transition");
    assert_eq!(resp["error"]["details"]["status"], json!("not_submitted"));

    request_ok(&mut stdin, &mut reader, "2", "submissions.submit", target.clone());
    let mut grade = target.clone();
    grade["score"] = json!(30);
    grade["graderId"] = json!("t-1");
    request_ok(&mut stdin, &mut reader, "3", "submissions.grade", grade);

    let mut excuse = target.clone();
    excuse["graderId"] = json!("t-1");
    excuse["reason"] = json!("medical");
    let resp = request(&mut stdin, &mut reader, "4", "submissions.excuse", excuse.clone());
    assert_eq!(error_code(&resp), "illegal_transition");
    assert_eq!(resp["error"]["details"]["status"], json!("graded"));

    excuse["override"] = json!(true);
    let excused = request_ok(&mut stdin, &mut reader, "5", "submissions.excuse", excuse);
    assert_eq!(excused["submission"]["status"], json!("excused"));
    assert_eq!(excused["submission"]["feedback"], json!("medical"));

    // setStatus only works as an explicit override.
    let mut set_late = target.clone();
    set_late["status"] = json!("late");
    let resp = request(&mut stdin, &mut reader, "6", "submissions.setStatus", set_late.clone());
    assert_eq!(error_code(&resp), "bad_params");
    set_late["override"] = json!(true);
    let late = request_ok(&mut stdin, &mut reader, "7", "submissions.setStatus", set_late);
    assert_eq!(late["submission"]["status"], json!("late"));

    // Workspaces can turn overrides off entirely.
    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "settings.update",
        json!({ "patch": { "allowOverride": false } }),
    );
    let mut forced = target.clone();
    forced["status"] = json!("submitted");
    forced["override"] = json!(true);
    let resp = request(&mut stdin, &mut reader, "9", "submissions.setStatus", forced);
    assert_eq!(error_code(&resp), "override_disabled");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(fx.workspace);
}

#[test]
fn return_for_revision_then_resubmit_counts_attempts() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, "gradebook-lifecycle-revision");
    let target = json!({ "assignmentId": fx.assignment_id, "studentId": fx.student_id });

    request_ok(&mut stdin, &mut reader, "1", "submissions.submit", target.clone());
    let mut ret = target.clone();
    ret["graderId"] = json!("t-1");
    ret["feedback"] = json!("Cite your sources.");
    let returned = request_ok(&mut stdin, &mut reader, "2", "submissions.returnForRevision", ret);
    assert_eq!(returned["submission"]["status"], json!("returned_for_revision"));
    assert_eq!(returned["submission"]["feedback"], json!("Cite your sources."));

    let flagged = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.requestFeedback",
        target.clone(),
    );
    assert_eq!(flagged["submission"]["feedbackRequested"], json!(true));
    assert_eq!(flagged["submission"]["status"], json!("returned_for_revision"));

    let again = request_ok(&mut stdin, &mut reader, "4", "submissions.submit", target.clone());
    assert_eq!(again["submission"]["status"], json!("submitted"));
    assert_eq!(again["submission"]["attemptCount"], json!(2));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "submissions.list",
        json!({ "assignmentId": fx.assignment_id }),
    );
    assert_eq!(listed["submissions"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(fx.workspace);
}

#[test]
fn unenrolled_students_have_no_submission() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup(&mut stdin, &mut reader, "gradebook-lifecycle-unenrolled");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "submissions.submit",
        json!({ "assignmentId": fx.assignment_id, "studentId": "nobody" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(fx.workspace);
}
