#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, BufReader, Cursor, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use recordbookd::catalog::Entity;
use recordbookd::sanitize::Record;
use recordbookd::store::{RecordStore, StoreError};
use serde_json::{json, Value};

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

pub fn rec(v: Value) -> Record {
    v.as_object().cloned().expect("record literal must be an object")
}

/// Build an in-memory ZIP from `(name, contents)` pairs.
pub fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in members {
        zip.start_file(*name, opts).expect("start member");
        zip.write_all(contents.as_bytes()).expect("write member");
    }
    zip.finish().expect("finish zip").into_inner()
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_recordbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
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
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

pub fn error_code(resp: &Value) -> Option<&str> {
    resp.get("error")?.get("code")?.as_str()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ping,
    Clear(Entity),
    Add(Entity),
}

/// In-memory store that records every call and can be told to misbehave.
#[derive(Default)]
pub struct RecordingStore {
    pub calls: RefCell<Vec<Call>>,
    pub rows: RefCell<BTreeMap<Entity, Vec<Record>>>,
    pub unreachable: bool,
    /// Entities whose `clear` reports the store as gone.
    pub clear_unavailable: HashSet<Entity>,
    /// Records carrying this key are rejected by `add`.
    pub reject_key: Option<&'static str>,
    next_id: Cell<i64>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clears(&self) -> Vec<Entity> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Clear(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Entities in the order of their first `add`.
    pub fn insert_sequence(&self) -> Vec<Entity> {
        let mut out: Vec<Entity> = Vec::new();
        for call in self.calls() {
            if let Call::Add(e) = call {
                if out.last() != Some(&e) {
                    out.push(e);
                }
            }
        }
        out
    }

    pub fn count(&self, entity: Entity) -> usize {
        self.rows.borrow().get(&entity).map(Vec::len).unwrap_or(0)
    }

    pub fn seed(&self, entity: Entity, records: Vec<Record>) {
        self.rows.borrow_mut().entry(entity).or_default().extend(records);
    }
}

impl RecordStore for RecordingStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.calls.borrow_mut().push(Call::Ping);
        if self.unreachable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn get_all(&self, entity: Entity) -> Result<Vec<Record>, StoreError> {
        Ok(self.rows.borrow().get(&entity).cloned().unwrap_or_default())
    }

    fn get_one(&self, entity: Entity, id: i64) -> Result<Option<Record>, StoreError> {
        Ok(self
            .get_all(entity)?
            .into_iter()
            .find(|r| r.get("id").and_then(|v| v.as_i64()) == Some(id)))
    }

    fn add(&self, entity: Entity, record: &Record) -> Result<Record, StoreError> {
        self.calls.borrow_mut().push(Call::Add(entity));
        if let Some(key) = self.reject_key {
            if record.contains_key(key) {
                return Err(StoreError::Storage(format!("{key} is not accepted")));
            }
        }
        let mut stored = record.clone();
        if !stored.contains_key("id") {
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            stored.insert("id".into(), json!(id));
        }
        self.rows
            .borrow_mut()
            .entry(entity)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    fn update(&self, entity: Entity, record: &Record) -> Result<Record, StoreError> {
        let id = record.get("id").and_then(|v| v.as_i64()).unwrap_or(-1);
        let mut rows = self.rows.borrow_mut();
        let row = rows
            .get_mut(&entity)
            .and_then(|rs| rs.iter_mut().find(|r| r.get("id").and_then(|v| v.as_i64()) == Some(id)))
            .ok_or(StoreError::NotFound { entity, id })?;
        for (k, v) in record {
            row.insert(k.clone(), v.clone());
        }
        Ok(row.clone())
    }

    fn clear(&self, entity: Entity) -> Result<(), StoreError> {
        self.calls.borrow_mut().push(Call::Clear(entity));
        if self.clear_unavailable.contains(&entity) {
            return Err(StoreError::Unavailable("disk went away".into()));
        }
        self.rows.borrow_mut().remove(&entity);
        Ok(())
    }
}
