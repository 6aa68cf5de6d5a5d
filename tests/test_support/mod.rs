#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_kbmrecapd");
    let mut child = Command::new(exe)
        .env_remove("KBMRECAPD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn kbmrecapd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Sends a request expected to fail and returns its error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

pub fn str_field(value: &serde_json::Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, value))
        .to_string()
}

/// Ids created by [`seed_village`].
pub struct Seed {
    pub village_id: String,
    pub alpha_id: String,
    pub beta_id: String,
}

/// One village with groups Alpha and Beta, learner categories 1 and 20, and
/// material category 1. Request ids are prefixed with `seed-`.
pub fn seed_village(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seed {
    let village = request_ok(
        stdin,
        reader,
        "seed-1",
        "villages.create",
        json!({ "name": "Sukamaju" }),
    );
    let village_id = str_field(&village, "/village/id");
    let alpha = request_ok(
        stdin,
        reader,
        "seed-2",
        "groups.create",
        json!({ "villageId": village_id, "name": "Alpha" }),
    );
    let beta = request_ok(
        stdin,
        reader,
        "seed-3",
        "groups.create",
        json!({ "villageId": village_id, "name": "Beta" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-4",
        "categories.upsert",
        json!({ "id": 1, "name": "Caberawit" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-5",
        "categories.upsert",
        json!({ "id": 20, "name": "Praja" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-6",
        "materialCategories.upsert",
        json!({ "id": 1, "name": "Aqidah" }),
    );
    Seed {
        village_id,
        alpha_id: str_field(&alpha, "/group/id"),
        beta_id: str_field(&beta, "/group/id"),
    }
}

pub fn create_generus(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    group_id: &str,
    category_id: i64,
    name: &str,
    gender: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "generus.create",
        json!({
            "groupId": group_id,
            "categoryId": category_id,
            "name": name,
            "gender": gender
        }),
    );
    str_field(&created, "/generus/id")
}
