use crate::actor::Actor;
use crate::backup;
use crate::error::ImportError;
use crate::import::{import_snapshot, ImportOptions, Upload};
use crate::ipc::error::{
    optional_param, require_db, required_param, required_str, respond, HandlerErr,
};
use crate::replace::ReplaceOptions;
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;
use std::path::{Path, PathBuf};

fn import_error(e: ImportError) -> HandlerErr {
    let code = e.code();
    let details = match &e {
        ImportError::RecordInsert { entity, index, .. } => {
            Some(json!({ "entity": entity, "index": index }))
        }
        ImportError::Storage { entity, .. } => Some(json!({ "entity": entity })),
        ImportError::Parse { member, .. } => Some(json!({ "member": member })),
        _ => None,
    };
    HandlerErr {
        code,
        message: e.to_string(),
        details,
    }
}

/// The upload comes either from a file on disk (`inPath`) or inline as a JSON
/// document (`document`). An inline document is always JSON, so any
/// `fileName` sent with it must name a `.json` file.
fn read_upload(req: &Request) -> Result<Upload, HandlerErr> {
    let file_name = req
        .params
        .get("fileName")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let content_type = req
        .params
        .get("contentType")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if let Some(doc) = req.params.get("document").filter(|v| !v.is_null()) {
        if let Some(name) = file_name
            .as_deref()
            .filter(|n| !n.to_ascii_lowercase().ends_with(".json"))
        {
            return Err(HandlerErr::new(
                "bad_params",
                format!("inline document cannot be named {name}"),
            )
            .with_details(json!({ "fileName": name })));
        }
        let bytes = serde_json::to_vec(doc)
            .map_err(|e| HandlerErr::new("bad_params", format!("invalid document: {e}")))?;
        return Ok(Upload {
            file_name: file_name.or_else(|| Some("snapshot.json".to_string())),
            content_type,
            bytes,
        });
    }

    let in_path = required_str(req, "inPath")?;
    let bytes = std::fs::read(&in_path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": in_path }))
    })?;
    let file_name = file_name.or_else(|| {
        Path::new(&in_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    });
    Ok(Upload {
        file_name,
        content_type,
        bytes,
    })
}

fn snapshot_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let actor: Actor = required_param(req, "actor")?;
    let options = ImportOptions {
        actor,
        replace: optional_param::<ReplaceOptions>(req, "options")?,
    };
    let upload = read_upload(req)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut trail: Vec<u8> = Vec::new();
    let outcome = {
        let store = SqliteStore::new(&tx);
        let mut sink = |p: u8| trail.push(p);
        import_snapshot(&store, upload, &options, &mut sink)
    };
    let report = match outcome {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(target: "recordbookd", event = "import_failed", code = e.code(), error = %e);
            let _ = tx.rollback();
            return Err(import_error(e));
        }
    };
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    let mut result = serde_json::to_value(&report)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    result["progressTrail"] = json!(trail);
    Ok(result)
}

fn snapshot_export_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out_path = required_str(req, "outPath")?;
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let export = backup::export_snapshot_bundle(&store, &PathBuf::from(&out_path)).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    })?;
    tracing::info!(
        target: "recordbookd",
        event = "snapshot_exported",
        path = %out_path,
        records = export.record_count
    );
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "recordCount": export.record_count
    }))
}

/// Writes to `outPath` when given, otherwise returns the document inline.
fn snapshot_export_json(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let store = SqliteStore::new(conn);
    let Some(out_path) = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
    else {
        return backup::snapshot_document(&store)
            .map(|doc| json!({ "document": doc }))
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()));
    };
    let export = backup::export_snapshot_json(&store, Path::new(out_path)).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    })?;
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "recordCount": export.record_count
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "snapshot.import" => Some(respond(req, snapshot_import(state, req))),
        "snapshot.exportBundle" => Some(respond(req, snapshot_export_bundle(state, req))),
        "snapshot.exportJson" => Some(respond(req, snapshot_export_json(state, req))),
        _ => None,
    }
}
