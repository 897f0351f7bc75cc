use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::actor::Actor;
use crate::catalog::Entity;
use crate::export::{int_field, text_of};
use crate::sanitize::Record;
use crate::store::{record_id, RecordStore, StoreError};

/// Cap used when a class does not set one.
pub const DEFAULT_MAX_MARK: f64 = 100.0;

#[derive(Debug, Error)]
pub enum MarksError {
    #[error("class {0} not found")]
    ClassNotFound(i64),
    #[error("{actor} does not teach class {class_id}")]
    Forbidden { actor: String, class_id: i64 },
    #[error("negative marks are not allowed (student {student_id})")]
    NegativeMark { student_id: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MarksError {
    pub fn code(&self) -> &'static str {
        match self {
            MarksError::ClassNotFound(_) => "not_found",
            MarksError::Forbidden { .. } => "forbidden",
            MarksError::NegativeMark { .. } => "bad_params",
            MarksError::Store(StoreError::Unavailable(_)) => "storage_unavailable",
            MarksError::Store(_) => "db_update_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    pub student_id: i64,
    #[serde(default)]
    pub midsem: f64,
    #[serde(default)]
    pub assignment: f64,
    #[serde(default)]
    pub attendance: f64,
}

impl MarkEntry {
    pub fn total(&self) -> f64 {
        self.midsem + self.assignment + self.attendance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapWarning {
    pub student_id: i64,
    pub component: &'static str,
    pub value: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    pub added: usize,
    pub updated: usize,
    pub warnings: Vec<CapWarning>,
}

fn float_field(record: &Record, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn same_text(a: Option<&Value>, b: Option<&Value>) -> bool {
    text_of(a).trim().eq_ignore_ascii_case(text_of(b).trim())
}

fn load_class(store: &dyn RecordStore, class_id: i64) -> Result<Record, MarksError> {
    store
        .get_one(Entity::Classes, class_id)?
        .ok_or(MarksError::ClassNotFound(class_id))
}

fn teaches(actor: &Actor, class: &Record) -> bool {
    match actor {
        Actor::Admin => true,
        Actor::Faculty { .. } => {
            let Some(name) = actor.faculty_name() else {
                return false;
            };
            text_of(class.get("faculty"))
                .trim()
                .eq_ignore_ascii_case(name.trim())
        }
        Actor::Student { .. } => false,
    }
}

/// Classes an actor may manage marks for: everything for admins, classes
/// whose `faculty` names them for faculty, nothing for students.
pub fn visible_classes(store: &dyn RecordStore, actor: &Actor) -> Result<Vec<Record>, MarksError> {
    if matches!(actor, Actor::Student { .. }) {
        return Ok(Vec::new());
    }
    Ok(store
        .get_all(Entity::Classes)?
        .into_iter()
        .filter(|c| teaches(actor, c))
        .collect())
}

/// Load `class_id` if `actor` may manage its marks.
pub fn ensure_can_manage(
    store: &dyn RecordStore,
    actor: &Actor,
    class_id: i64,
) -> Result<Record, MarksError> {
    let class = load_class(store, class_id)?;
    if !teaches(actor, &class) {
        return Err(MarksError::Forbidden {
            actor: actor.to_string(),
            class_id,
        });
    }
    Ok(class)
}

/// Students enrolled in a class by department and semester, by roll number.
pub fn class_roster(store: &dyn RecordStore, class_id: i64) -> Result<Vec<Record>, MarksError> {
    let class = load_class(store, class_id)?;
    let semester = int_field(&class, "semester");
    let mut roster: Vec<Record> = store
        .get_all(Entity::Students)?
        .into_iter()
        .filter(|s| {
            same_text(s.get("department"), class.get("department"))
                && int_field(s, "semester") == semester
        })
        .collect();
    roster.sort_by_key(|s| text_of(s.get("rollno")));
    Ok(roster)
}

pub fn class_marks(store: &dyn RecordStore, class_id: i64) -> Result<Vec<Record>, MarksError> {
    Ok(store
        .get_all(Entity::InternalMarks)?
        .into_iter()
        .filter(|m| int_field(m, "classid") == Some(class_id))
        .collect())
}

fn check_caps(class: &Record, entry: &MarkEntry, warnings: &mut Vec<CapWarning>) {
    let components = [
        ("midsem", "max_midsem", entry.midsem),
        ("assignment", "max_assignment", entry.assignment),
        ("attendance", "max_attendance", entry.attendance),
    ];
    for (component, cap_key, value) in components {
        let max = float_field(class, cap_key).unwrap_or(DEFAULT_MAX_MARK);
        if value > max {
            warnings.push(CapWarning {
                student_id: entry.student_id,
                component,
                value,
                max,
            });
        }
    }
}

/// Upsert one mark row per entry for `class_id`. Totals are derived; values
/// over the class caps are saved and reported back as warnings.
pub fn save_class_marks(
    store: &dyn RecordStore,
    actor: &Actor,
    class_id: i64,
    entries: &[MarkEntry],
    now: &str,
) -> Result<SaveSummary, MarksError> {
    let class = ensure_can_manage(store, actor, class_id)?;
    if let Some(bad) = entries
        .iter()
        .find(|e| e.midsem < 0.0 || e.assignment < 0.0 || e.attendance < 0.0)
    {
        return Err(MarksError::NegativeMark {
            student_id: bad.student_id,
        });
    }

    let existing: HashMap<i64, Record> = class_marks(store, class_id)?
        .into_iter()
        .filter_map(|m| int_field(&m, "studentid").map(|sid| (sid, m)))
        .collect();

    let mut summary = SaveSummary::default();
    for entry in entries {
        check_caps(&class, entry, &mut summary.warnings);

        let mut record = Record::new();
        record.insert("classid".into(), Value::from(class_id));
        record.insert("studentid".into(), Value::from(entry.student_id));
        record.insert("midsem".into(), Value::from(entry.midsem));
        record.insert("assignment".into(), Value::from(entry.assignment));
        record.insert("attendance".into(), Value::from(entry.attendance));
        record.insert("total".into(), Value::from(entry.total()));
        record.insert("updatedat".into(), Value::from(now));

        match existing.get(&entry.student_id).and_then(record_id) {
            Some(id) => {
                record.insert("id".into(), Value::from(id));
                store.update(Entity::InternalMarks, &record)?;
                summary.updated += 1;
            }
            None => {
                record.insert("createdat".into(), Value::from(now));
                store.add(Entity::InternalMarks, &record)?;
                summary.added += 1;
            }
        }
    }

    tracing::info!(
        target: "recordbookd",
        event = "marks_saved",
        class_id,
        added = summary.added,
        updated = summary.updated,
        warnings = summary.warnings.len()
    );
    Ok(summary)
}
