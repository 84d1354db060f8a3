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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
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
        .and_then(|c| c.as_str())
        .unwrap_or("")
}

#[test]
fn resolve_assigns_roles_by_kind_and_reserved_identifier() {
    let workspace = temp_dir("rosterd-auth-roles");
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.register",
        json!({ "kind": "teacher", "identifier": "TCH-001", "name": "Alan Grant" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.register",
        json!({ "kind": "student", "identifier": "231CG001", "name": "Jane Doe" }),
    );

    // The seeded reserved teacher resolves as admin.
    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.resolve",
        json!({ "identifier": "ADMIN001", "secret": "admin123" }),
    );
    assert_eq!(admin.get("role").and_then(|v| v.as_str()), Some("admin"));

    // A non-reserved teacher resolves as teacher, with a case-folded lookup.
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.resolve",
        json!({ "identifier": "  tch-001 ", "secret": "admin123" }),
    );
    assert_eq!(teacher.get("role").and_then(|v| v.as_str()), Some("teacher"));
    assert_eq!(
        teacher.get("identifier").and_then(|v| v.as_str()),
        Some("TCH-001")
    );
    assert_eq!(
        teacher.get("displayName").and_then(|v| v.as_str()),
        Some("ALAN GRANT")
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.resolve",
        json!({ "identifier": "231cg001", "secret": "pass123" }),
    );
    assert_eq!(student.get("role").and_then(|v| v.as_str()), Some("student"));
}

#[test]
fn mismatched_secrets_fail_with_a_generic_error() {
    let workspace = temp_dir("rosterd-auth-bad-secret");
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.register",
        json!({ "kind": "student", "identifier": "231CG001", "name": "Jane Doe" }),
    );

    // Wrong secret for an existing student, a student secret against the
    // teacher table, and an unknown identifier all produce the same code.
    for (i, (identifier, secret)) in [
        ("231CG001", "admin123"),
        ("ADMIN001", "pass123"),
        ("NOBODY99", "pass123"),
    ]
    .iter()
    .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "auth.resolve",
            json!({ "identifier": identifier, "secret": secret }),
        );
        assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(error_code(&resp), "invalid_credentials");
        let message = resp
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("");
        assert_eq!(message, "invalid credentials");
    }
}

#[test]
fn workspace_secret_override_replaces_the_defaults() {
    let workspace = temp_dir("rosterd-auth-override");
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({
            "path": workspace.to_string_lossy(),
            "staffSecret": "s3cret",
            "studentSecret": "hunter2"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.register",
        json!({ "kind": "student", "identifier": "231CG002", "name": "John Roe" }),
    );

    let default_secret = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.resolve",
        json!({ "identifier": "231CG002", "secret": "pass123" }),
    );
    assert_eq!(error_code(&default_secret), "invalid_credentials");

    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.resolve",
        json!({ "identifier": "231CG002", "secret": "hunter2" }),
    );
    assert_eq!(resolved.get("role").and_then(|v| v.as_str()), Some("student"));
}
