use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::catalog::Entity;
use crate::sanitize::Record;
use crate::store::{record_id, RecordStore, StoreError};

const MISSING: &str = "N/A";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("class {0} not found")]
    ClassNotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Cell {
    /// A column of the joined student.
    Student(&'static str),
    /// "firstname lastname" of the joined student.
    StudentName,
    /// A column of the reported row itself.
    Field(&'static str),
}

struct ReportColumn {
    header: &'static str,
    cell: Cell,
}

/// One class-scoped CSV report over an entity that carries `classid` and
/// `studentid`.
pub struct ReportSpec {
    entity: Entity,
    title: &'static str,
    file_prefix: &'static str,
    columns: &'static [ReportColumn],
}

pub const MARKS_REPORT: ReportSpec = ReportSpec {
    entity: Entity::InternalMarks,
    title: "Internal Marks Report",
    file_prefix: "InternalMarks",
    columns: &[
        ReportColumn { header: "Roll No", cell: Cell::Student("rollno") },
        ReportColumn { header: "Name", cell: Cell::StudentName },
        ReportColumn { header: "Mid-Sem", cell: Cell::Field("midsem") },
        ReportColumn { header: "Assignment", cell: Cell::Field("assignment") },
        ReportColumn { header: "Attendance", cell: Cell::Field("attendance") },
        ReportColumn { header: "Total", cell: Cell::Field("total") },
    ],
};

pub const ATTENDANCE_REPORT: ReportSpec = ReportSpec {
    entity: Entity::Attendance,
    title: "Attendance Report",
    file_prefix: "Attendance",
    columns: &[
        ReportColumn { header: "Roll No", cell: Cell::Student("rollno") },
        ReportColumn { header: "Name", cell: Cell::StudentName },
        ReportColumn { header: "Date", cell: Cell::Field("date") },
        ReportColumn { header: "Session", cell: Cell::Field("session") },
        ReportColumn { header: "Status", cell: Cell::Field("status") },
        ReportColumn { header: "Notes", cell: Cell::Field("notes") },
    ],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassReport {
    pub file_name: String,
    pub rows: usize,
    pub csv: String,
}

pub(crate) fn int_field(record: &Record, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

pub(crate) fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => format_number(n),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Output is never quoted, so separators are removed from free text.
fn cell_text(raw: String) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '\n' | '\r'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn student_name(student: &Record) -> String {
    let first = text_of(student.get("firstname"));
    let last = text_of(student.get("lastname"));
    let joined = format!("{} {}", first.trim(), last.trim());
    let joined = joined.trim();
    if joined.is_empty() {
        MISSING.to_string()
    } else {
        joined.to_string()
    }
}

fn render_cell(cell: &Cell, row: &Record, student: Option<&Record>) -> String {
    let text = match (cell, student) {
        (Cell::Field(key), _) => text_of(row.get(*key)),
        (Cell::StudentName, Some(s)) => student_name(s),
        (Cell::Student(key), Some(s)) => {
            let t = text_of(s.get(*key));
            if t.is_empty() {
                MISSING.to_string()
            } else {
                t
            }
        }
        (Cell::StudentName | Cell::Student(_), None) => MISSING.to_string(),
    };
    cell_text(text)
}

/// Render `spec` for one class: a title line, the header line, then one line
/// per row of the class joined to its student.
pub fn compose_class_report(
    store: &dyn RecordStore,
    spec: &ReportSpec,
    class_id: i64,
) -> Result<ClassReport, ExportError> {
    let class = store
        .get_one(Entity::Classes, class_id)?
        .ok_or(ExportError::ClassNotFound(class_id))?;
    let code = cell_text(text_of(class.get("code")));
    let name = cell_text(text_of(class.get("name")));

    let students: HashMap<i64, Record> = store
        .get_all(Entity::Students)?
        .into_iter()
        .filter_map(|s| record_id(&s).map(|id| (id, s)))
        .collect();

    let rows: Vec<Record> = store
        .get_all(spec.entity)?
        .into_iter()
        .filter(|r| int_field(r, "classid") == Some(class_id))
        .collect();

    let mut csv = format!("{} - {} ({})\n", spec.title, code, name);
    let header = spec
        .columns
        .iter()
        .map(|c| c.header)
        .collect::<Vec<_>>()
        .join(",");
    csv.push_str(&header);
    csv.push('\n');
    for row in &rows {
        let student = int_field(row, "studentid").and_then(|id| students.get(&id));
        let line = spec
            .columns
            .iter()
            .map(|c| render_cell(&c.cell, row, student))
            .collect::<Vec<_>>()
            .join(",");
        csv.push_str(&line);
        csv.push('\n');
    }

    Ok(ClassReport {
        file_name: format!("{}_{}.csv", spec.file_prefix, code),
        rows: rows.len(),
        csv,
    })
}
