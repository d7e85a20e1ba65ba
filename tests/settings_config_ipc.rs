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

#[test]
fn grading_config_updates_apply_and_persist() {
    let workspace = temp_dir("gradebook-settings");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );

        let defaults = request_ok(&mut stdin, &mut reader, "2", "settings.get", json!({}));
        assert_eq!(
            defaults["config"],
            json!({ "letterScale": "fine", "achievementTable": "standard", "allowOverride": true })
        );

        let fine = request_ok(&mut stdin, &mut reader, "3", "grades.letter", json!({ "percentage": 88 }));
        assert_eq!(fine["letter"], json!("B+"));
        let standard = request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "grades.achievementLevel",
            json!({ "percentage": 86 }),
        );
        assert_eq!(standard["level"], json!(3));

        let updated = request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "settings.update",
            json!({ "patch": { "letterScale": "coarse", "achievementTable": "alternate" } }),
        );
        assert_eq!(updated["config"]["letterScale"], json!("coarse"));
        assert_eq!(updated["config"]["allowOverride"], json!(true));

        let coarse = request_ok(&mut stdin, &mut reader, "6", "grades.letter", json!({ "percentage": 88 }));
        assert_eq!(coarse["letter"], json!("B"));
        // gpaPoints always come from the fine grade.
        assert_eq!(coarse["gpaPoints"], json!(3.3));
        let explicit = request_ok(
            &mut stdin,
            &mut reader,
            "7",
            "grades.letter",
            json!({ "percentage": 88, "scale": "fine" }),
        );
        assert_eq!(explicit["letter"], json!("B+"));

        let alternate = request_ok(
            &mut stdin,
            &mut reader,
            "8",
            "grades.achievementLevel",
            json!({ "score": 43, "totalPoints": 50 }),
        );
        assert_eq!(alternate["level"], json!(4));
        assert_eq!(alternate["table"], json!("alternate"));

        drop(stdin);
        let _ = child.wait();
    }

    // A fresh process picks the saved config up on workspace.select.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["config"]["letterScale"], json!("coarse"));
    assert_eq!(selected["config"]["achievementTable"], json!("alternate"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bad_settings_patches_are_rejected_without_changes() {
    let workspace = temp_dir("gradebook-settings-bad");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let unknown = request(
        &mut stdin,
        &mut reader,
        "2",
        "settings.update",
        json!({ "patch": { "roundingMode": "bankers" } }),
    );
    assert_eq!(error_code(&unknown), "bad_params");

    let bad_value = request(
        &mut stdin,
        &mut reader,
        "3",
        "settings.update",
        json!({ "patch": { "letterScale": "percent" } }),
    );
    assert_eq!(error_code(&bad_value), "bad_params");

    let current = request_ok(&mut stdin, &mut reader, "4", "settings.get", json!({}));
    assert_eq!(current["config"]["letterScale"], json!("fine"));

    let negative = request(&mut stdin, &mut reader, "5", "grades.letter", json!({ "percentage": -1 }));
    assert_eq!(error_code(&negative), "bad_params");
    let above = request_ok(&mut stdin, &mut reader, "6", "grades.letter", json!({ "percentage": 104 }));
    assert_eq!(above["letter"], json!("A+"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
