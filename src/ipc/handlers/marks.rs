use crate::actor::Actor;
use crate::export::{compose_class_report, ExportError, ReportSpec, ATTENDANCE_REPORT, MARKS_REPORT};
use crate::ipc::error::{
    optional_param, require_db, required_i64, required_param, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::marks::{self, MarkEntry, MarksError};
use crate::store::SqliteStore;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::path::PathBuf;

fn marks_error(e: MarksError) -> HandlerErr {
    let details = match &e {
        MarksError::ClassNotFound(id) | MarksError::Forbidden { class_id: id, .. } => {
            Some(json!({ "classId": id }))
        }
        MarksError::NegativeMark { student_id } => Some(json!({ "studentId": student_id })),
        MarksError::Store(_) => None,
    };
    HandlerErr {
        code: e.code(),
        message: e.to_string(),
        details,
    }
}

fn export_error(e: ExportError) -> HandlerErr {
    match e {
        ExportError::ClassNotFound(id) => HandlerErr::new("not_found", e.to_string())
            .with_details(json!({ "classId": id })),
        ExportError::Store(_) => HandlerErr::new("db_query_failed", e.to_string()),
    }
}

fn classes_visible(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let actor: Actor = required_param(req, "actor")?;
    let conn = require_db(state)?;
    let classes = marks::visible_classes(&SqliteStore::new(conn), &actor).map_err(marks_error)?;
    Ok(json!({ "classes": classes }))
}

fn marks_roster(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(req, "classId")?;
    let actor: Actor = required_param(req, "actor")?;
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let class = marks::ensure_can_manage(&store, &actor, class_id).map_err(marks_error)?;
    let students = marks::class_roster(&store, class_id).map_err(marks_error)?;
    let saved = marks::class_marks(&store, class_id).map_err(marks_error)?;
    Ok(json!({
        "class": class,
        "students": students,
        "marks": saved
    }))
}

fn marks_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(req, "classId")?;
    let actor: Actor = required_param(req, "actor")?;
    let entries: Vec<MarkEntry> = optional_param(req, "entries")?;
    let conn = require_db(state)?;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let saved = marks::save_class_marks(&SqliteStore::new(&tx), &actor, class_id, &entries, &now);
    let summary = match saved {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.rollback();
            return Err(marks_error(e));
        }
    };
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    serde_json::to_value(&summary).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

/// Returns the CSV inline and also writes it when `outPath` is given.
fn class_report(
    state: &mut AppState,
    req: &Request,
    spec: &ReportSpec,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_i64(req, "classId")?;
    let conn = require_db(state)?;
    let report = compose_class_report(&SqliteStore::new(conn), spec, class_id).map_err(export_error)?;

    let out_path = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);
    if let Some(path) = &out_path {
        std::fs::write(path, &report.csv).map_err(|e| {
            HandlerErr::new("io_failed", e.to_string())
                .with_details(json!({ "path": path.to_string_lossy() }))
        })?;
    }

    Ok(json!({
        "fileName": report.file_name,
        "rows": report.rows,
        "csv": report.csv,
        "path": out_path.map(|p| p.to_string_lossy().to_string())
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.visible" => Some(respond(req, classes_visible(state, req))),
        "marks.roster" => Some(respond(req, marks_roster(state, req))),
        "marks.save" => Some(respond(req, marks_save(state, req))),
        "marks.exportCsv" => Some(respond(req, class_report(state, req, &MARKS_REPORT))),
        "attendance.exportCsv" => Some(respond(req, class_report(state, req, &ATTENDANCE_REPORT))),
        _ => None,
    }
}
