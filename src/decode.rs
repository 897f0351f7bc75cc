use std::io::{Cursor, Read};

use serde_json::Value;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::sanitize::Record;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json array of records, found {found}")]
    NotAnArray { found: &'static str },
    #[error("expected a json object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("content is not valid utf-8")]
    Utf8,
    #[error("invalid archive: {0}")]
    Archive(#[from] ZipError),
    #[error("failed to read archive member {name}: {source}")]
    MemberRead {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Keep the object items of a json array; anything else in it is skipped.
pub fn records_from_array(items: &[Value]) -> Vec<Record> {
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match item.as_object() {
            Some(obj) => out.push(obj.clone()),
            None => tracing::warn!(
                target: "recordbookd",
                event = "decode_skip_item",
                index = idx,
                kind = kind_of(item)
            ),
        }
    }
    out
}

/// Spreadsheet and editor exports often lead with a UTF-8 byte order mark,
/// which `str::trim` keeps.
pub(crate) fn strip_bom(text: &str) -> &str {
    text.trim_start_matches('\u{feff}')
}

pub fn decode_json_records(text: &str) -> Result<Vec<Record>, DecodeError> {
    let value: Value = serde_json::from_str(strip_bom(text))?;
    match value {
        Value::Array(items) => Ok(records_from_array(&items)),
        other => Err(DecodeError::NotAnArray {
            found: kind_of(&other),
        }),
    }
}

fn strip_quote_pair(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

fn clean_field(raw: &str) -> String {
    strip_quote_pair(raw.trim()).to_string()
}

/// Split one data line. A `"` flips the in-quotes state and is dropped; a
/// `,` outside quotes ends the field.
fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(clean_field(&buf));
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }
    out.push(clean_field(&buf));
    out
}

/// Decode CSV text into records keyed by the header row. Every value is a
/// string; short rows are padded with `""` and long rows truncated.
pub fn decode_csv_records(text: &str) -> Vec<Record> {
    let lines: Vec<&str> = strip_bom(text)
        .trim()
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    if lines.len() < 2 {
        return Vec::new();
    }

    let headers: Vec<String> = lines[0].split(',').map(clean_field).collect();

    let mut out = Vec::new();
    for line in &lines[1..] {
        if line.trim().is_empty() {
            continue;
        }
        let values = parse_csv_record(line);
        let mut record = Record::new();
        for (idx, header) in headers.iter().enumerate() {
            let value = values.get(idx).cloned().unwrap_or_default();
            record.insert(header.clone(), Value::String(value));
        }
        out.push(record);
    }
    out
}

/// Decode an archive member by its extension. `None` for extensions that
/// carry no records.
pub fn decode_member(name: &str, bytes: &[u8]) -> Option<Result<Vec<Record>, DecodeError>> {
    let lowered = name.to_ascii_lowercase();
    let text = || std::str::from_utf8(bytes).map_err(|_| DecodeError::Utf8);
    if lowered.ends_with(".json") {
        Some(text().and_then(decode_json_records))
    } else if lowered.ends_with(".csv") {
        Some(text().map(decode_csv_records))
    } else {
        None
    }
}

/// Named-member lookup over a ZIP held in memory.
pub struct ArchiveReader {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl ArchiveReader {
    pub fn open(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(|n| n.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    pub fn member(&mut self, name: &str) -> Result<Option<Vec<u8>>, DecodeError> {
        let mut entry = match self.archive.by_name(name) {
            Ok(e) => e,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(DecodeError::Archive(e)),
        };
        if entry.is_dir() {
            return Ok(None);
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|source| DecodeError::MemberRead {
                name: name.to_string(),
                source,
            })?;
        Ok(Some(buf))
    }

    pub fn member_text(&mut self, name: &str) -> Result<Option<String>, DecodeError> {
        match self.member(name)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| DecodeError::Utf8),
            None => Ok(None),
        }
    }
}
