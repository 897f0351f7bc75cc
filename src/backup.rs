use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::{Entity, INSERT_ORDER};
use crate::store::RecordStore;

const MANIFEST_ENTRY: &str = "manifest.json";
pub const SNAPSHOT_FORMAT_V1: &str = "recordbook-snapshot-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub record_count: u64,
}

fn exported_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ensure_parent(out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    Ok(())
}

fn collect(store: &dyn RecordStore) -> anyhow::Result<Vec<(Entity, Vec<Value>)>> {
    INSERT_ORDER
        .into_iter()
        .map(|entity| {
            let rows = store
                .get_all(entity)
                .with_context(|| format!("failed to read {}", entity))?;
            Ok::<_, anyhow::Error>((entity, rows.into_iter().map(Value::Object).collect()))
        })
        .collect()
}

/// Write every collection as `<entity>.json` plus a checksummed manifest.
/// The result re-imports as a bundled archive.
pub fn export_snapshot_bundle(
    store: &dyn RecordStore,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let tables = collect(store)?;
    let mut members: Vec<(String, Vec<u8>)> = Vec::with_capacity(tables.len());
    let mut manifest_entities = serde_json::Map::new();
    let mut record_count = 0u64;
    for (entity, rows) in &tables {
        let bytes = serde_json::to_vec_pretty(rows)
            .with_context(|| format!("failed to serialize {}", entity))?;
        manifest_entities.insert(
            entity.as_str().to_string(),
            json!({
                "count": rows.len(),
                "sha256": format!("{:x}", Sha256::digest(&bytes)),
            }),
        );
        record_count += rows.len() as u64;
        members.push((entity.json_member(), bytes));
    }

    let manifest = json!({
        "format": SNAPSHOT_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at(),
        "entities": manifest_entities,
    });

    ensure_parent(out_path)?;
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, bytes) in &members {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start {} entry", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write {} entry", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: SNAPSHOT_FORMAT_V1.to_string(),
        entry_count: members.len() + 1,
        record_count,
    })
}

/// The single-document form: `{ "version", "exportedAt", "data": {...} }`.
pub fn snapshot_document(store: &dyn RecordStore) -> anyhow::Result<Value> {
    let mut data = serde_json::Map::new();
    for (entity, rows) in collect(store)? {
        data.insert(entity.as_str().to_string(), Value::Array(rows));
    }
    Ok(json!({
        "format": SNAPSHOT_FORMAT_V1,
        "version": 1,
        "exportedAt": exported_at(),
        "data": data,
    }))
}

pub fn export_snapshot_json(
    store: &dyn RecordStore,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let doc = snapshot_document(store)?;
    let record_count = doc
        .get("data")
        .and_then(|d| d.as_object())
        .map(|d| {
            d.values()
                .filter_map(|v| v.as_array())
                .map(|a| a.len() as u64)
                .sum()
        })
        .unwrap_or(0);
    ensure_parent(out_path)?;
    let text = serde_json::to_string_pretty(&doc).context("failed to serialize snapshot")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(ExportSummary {
        bundle_format: SNAPSHOT_FORMAT_V1.to_string(),
        entry_count: 1,
        record_count,
    })
}
