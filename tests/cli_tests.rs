//! Integration tests for the reqbind CLI
//!
//! These tests run the actual CLI binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get the binary to test
fn reqbind_cmd() -> Command {
    let mut cmd = Command::cargo_bin("reqbind").unwrap();
    cmd.env_remove("REQBIND_MAX_MEMORY")
        .env_remove("REQBIND_SPILL_DIR");
    cmd
}

const USER_SCHEMA: &str = r#"
name: User
fields:
  - name: id
    type: uint64
    tags: { uri: "id", form: "id" }
  - name: page
    type: int
    tags: { form: "page,default=1" }
  - name: tags
    type: "[]string"
    tags: { form: "tag" }
  - name: request_id
    type: string
    tags: { header: "X-Request-Id" }
  - name: name
    type: string
    tags: { form: "name" }
"#;

fn write_schema(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("schema.yaml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_help_flag() {
    reqbind_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bind"))
        .stdout(predicate::str::contains("tag"));
}

#[test]
fn test_bind_help() {
    reqbind_cmd()
        .args(["bind", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--schema"))
        .stdout(predicate::str::contains("--route"))
        .stdout(predicate::str::contains("--data-file"));
}

// ============================================================================
// tag
// ============================================================================

#[test]
fn test_tag_with_default() {
    reqbind_cmd()
        .args(["tag", "size,default=10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Name: size"))
        .stdout(predicate::str::contains("Default: \"10\""));
}

#[test]
fn test_tag_skip() {
    reqbind_cmd()
        .args(["tag", "-"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));
}

// ============================================================================
// bind
// ============================================================================

#[test]
fn test_bind_query_with_default() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["--url", "/users?tag=a&tag=b&name=ada"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"page\": 1"))
        .stdout(predicate::str::contains("\"name\": \"ada\""))
        .stdout(predicate::str::contains("\"a\""))
        .stderr(predicate::str::contains("query"));
}

#[test]
fn test_bind_uri_params() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["--url", "/users/42", "--route", "/users/:id", "--param", "id=42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 42"))
        .stderr(predicate::str::contains("uri"));
}

#[test]
fn test_bind_urlencoded_body() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["--url", "/users?name=query"])
        .args(["-H", "Content-Type: application/x-www-form-urlencoded"])
        .args(["--data", "name=body&page=3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"body\""))
        .stdout(predicate::str::contains("\"page\": 3"));
}

#[test]
fn test_bind_json_body() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["-H", "Content-Type: application/json; charset=utf-8"])
        .args(["--data", r#"{"id": 7, "name": "grace"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 7"))
        .stdout(predicate::str::contains("\"name\": \"grace\""))
        .stderr(predicate::str::contains("json"));
}

#[test]
fn test_bind_forced_header_binding() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--binding", "header", "--schema"])
        .arg(&schema)
        .args(["-H", "x-request-id: abc-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"request_id\": \"abc-1\""));
}

#[test]
fn test_bind_multipart_from_file() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(
        &dir,
        r#"
name: Upload
fields:
  - { name: title, type: string }
  - { name: avatar, type: "?file" }
"#,
    );
    let body = dir.path().join("body.txt");
    fs::write(
        &body,
        "--XB\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n\
         --XB\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
         Content-Type: image/png\r\n\r\nPNG\r\n--XB--\r\n",
    )
    .unwrap();

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["-H", "Content-Type: multipart/form-data; boundary=XB"])
        .arg("--data-file")
        .arg(&body)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"hello\""))
        .stdout(predicate::str::contains("\"filename\": \"me.png\""))
        .stdout(predicate::str::contains("\"size\": 3"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_bind_type_mismatch_shows_code_and_fix() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["--url", "/users?page=two"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("BIND-020"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_bind_required_field() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(
        &dir,
        "name: Login\nfields:\n  - { name: user, type: string, required: true }\n",
    );

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BIND-050"))
        .stderr(predicate::str::contains("user (is required)"));
}

#[test]
fn test_bind_unknown_schema_type() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, "name: Bad\nfields:\n  - { name: x, type: chan }\n");

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BIND-061"));
}

#[test]
fn test_bind_missing_schema_file() {
    reqbind_cmd()
        .args(["bind", "--schema", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load schema"));
}

#[test]
fn test_bind_bad_env_config() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .env("REQBIND_MAX_MEMORY", "lots")
        .args(["bind", "--schema"])
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BIND-060"))
        .stderr(predicate::str::contains("REQBIND_MAX_MEMORY"));
}

#[test]
fn test_bind_config_file_spills_uploads() {
    let dir = TempDir::new().unwrap();
    let spill = dir.path().join("spill");
    fs::create_dir(&spill).unwrap();
    fs::write(
        dir.path().join("reqbind.toml"),
        format!("max_memory = 1\nspill_dir = {:?}\n", spill.display().to_string()),
    )
    .unwrap();
    let schema = write_schema(&dir, "name: U\nfields:\n  - { name: doc, type: file }\n");

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--schema"])
        .arg(&schema)
        .args(["-H", "Content-Type: multipart/form-data; boundary=XB"])
        .args([
            "--data",
            "--XB\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\r\nlarger than one byte\r\n--XB--\r\n",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"filename\": \"a.txt\""));
}

#[test]
fn test_unknown_binding_name() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir, USER_SCHEMA);

    reqbind_cmd()
        .current_dir(dir.path())
        .args(["bind", "--binding", "yaml", "--schema"])
        .arg(&schema)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown binding 'yaml'"));
}
