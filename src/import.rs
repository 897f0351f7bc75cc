use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::error::ImportError;
use crate::payload::{decode_payload, PayloadShape};
use crate::replace::{replace_all, ReplaceOptions, ReplaceReport};
use crate::store::RecordStore;

/// Options accepted by `snapshot.import`. `actor` is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub actor: Actor,
    #[serde(flatten)]
    pub replace: ReplaceOptions,
}

impl ImportOptions {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            replace: ReplaceOptions::default(),
        }
    }
}

/// An uploaded snapshot: its bytes plus whatever hints came with them.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn named(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: None,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub shape: PayloadShape,
    #[serde(flatten)]
    pub replace: ReplaceReport,
}

/// Decode, sanitize and replace. The store is only touched once the upload
/// has been decoded into per-entity records.
pub fn import_snapshot(
    store: &dyn RecordStore,
    upload: Upload,
    options: &ImportOptions,
    progress: &mut dyn FnMut(u8),
) -> Result<ImportReport, ImportError> {
    if !options.actor.can_replace_workspace() {
        return Err(ImportError::Forbidden {
            actor: options.actor.to_string(),
        });
    }

    let decoded = decode_payload(
        upload.file_name.as_deref(),
        upload.content_type.as_deref(),
        upload.bytes,
    )?;
    tracing::info!(
        target: "recordbookd",
        event = "import_decoded",
        shape = ?decoded.shape,
        file = upload.file_name.as_deref().unwrap_or("")
    );

    let records = decoded.sanitized();
    let mut report = replace_all(store, &records, &options.replace, progress)?;
    for (entity, batch) in &decoded.batches {
        if let Some(outcome) = report.entities.get_mut(entity) {
            outcome.source = batch.source.clone();
            outcome.decode_error = batch.decode_error.clone();
        }
    }
    Ok(ImportReport {
        shape: decoded.shape,
        replace: report,
    })
}
