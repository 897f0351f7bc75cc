use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{wipe_order, Entity, INSERT_ORDER};
use crate::error::ImportError;
use crate::payload::EntityRecords;
use crate::sanitize::Record;
use crate::store::{RecordStore, StoreError};

/// Progress reported once the operation is under way.
pub const PROGRESS_START: u8 = 5;
/// Progress reported once every collection has been cleared.
pub const PROGRESS_WIPED: u8 = 45;
pub const PROGRESS_DONE: u8 = 100;

const MAX_ERRORS_PER_ENTITY: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertPolicy {
    /// Skip and count rejected records, keep going.
    #[default]
    BestEffort,
    /// Stop the insert phase at the first rejected record.
    AbortOnFirstError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplaceOptions {
    pub policy: InsertPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOutcome {
    pub received: u64,
    pub inserted: u64,
    pub failed: u64,
    /// First few rejections; `failed` has the full count.
    pub errors: Vec<RecordFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceReport {
    pub run_id: String,
    pub entities: BTreeMap<Entity, EntityOutcome>,
    pub inserted: u64,
    pub failed: u64,
    pub progress: u8,
}

impl ReplaceReport {
    pub fn entity(&self, entity: Entity) -> Option<&EntityOutcome> {
        self.entities.get(&entity)
    }
}

/// Forwards percentages to the caller, never letting them go backwards.
struct Progress<'a> {
    last: u8,
    sink: &'a mut dyn FnMut(u8),
}

impl<'a> Progress<'a> {
    fn new(sink: &'a mut dyn FnMut(u8)) -> Self {
        Self { last: 0, sink }
    }

    fn emit(&mut self, value: u8) {
        let value = value.clamp(self.last, PROGRESS_DONE);
        self.last = value;
        (self.sink)(value);
    }
}

fn scaled(step: usize, steps: usize, span: u8) -> u8 {
    if steps == 0 {
        return span;
    }
    ((step as f64 / steps as f64) * f64::from(span)).round() as u8
}

/// Replace the whole store with `records`: clear every collection dependents
/// first, then insert every collection dependencies first, one record at a
/// time. Nothing is touched if the store does not answer the initial ping.
pub fn replace_all(
    store: &dyn RecordStore,
    records: &EntityRecords,
    options: &ReplaceOptions,
    progress: &mut dyn FnMut(u8),
) -> Result<ReplaceReport, ImportError> {
    let run_id = Uuid::new_v4().to_string();
    let mut progress = Progress::new(progress);

    store.ping().map_err(|e| {
        tracing::error!(target: "recordbookd", event = "import_store_unreachable", run_id = %run_id, error = %e);
        ImportError::StorageUnavailable(e.to_string())
    })?;
    progress.emit(PROGRESS_START);
    tracing::info!(
        target: "recordbookd",
        event = "import_wipe_start",
        run_id = %run_id,
        policy = ?options.policy
    );

    wipe(store, &mut progress)?;

    let mut entities = BTreeMap::new();
    let mut inserted = 0u64;
    let mut failed = 0u64;
    for (idx, entity) in INSERT_ORDER.into_iter().enumerate() {
        let rows = records.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
        let outcome = insert_entity(store, entity, rows, options.policy)?;
        tracing::info!(
            target: "recordbookd",
            event = "import_entity_done",
            run_id = %run_id,
            entity = %entity,
            received = outcome.received,
            inserted = outcome.inserted,
            failed = outcome.failed
        );
        inserted += outcome.inserted;
        failed += outcome.failed;
        entities.insert(entity, outcome);
        progress.emit(PROGRESS_WIPED + scaled(idx + 1, INSERT_ORDER.len(), PROGRESS_DONE - PROGRESS_WIPED));
    }

    tracing::info!(
        target: "recordbookd",
        event = "import_done",
        run_id = %run_id,
        inserted,
        failed
    );
    Ok(ReplaceReport {
        run_id,
        entities,
        inserted,
        failed,
        progress: progress.last,
    })
}

fn wipe(store: &dyn RecordStore, progress: &mut Progress<'_>) -> Result<(), ImportError> {
    let order: Vec<Entity> = wipe_order().collect();
    for (idx, entity) in order.iter().enumerate() {
        store
            .clear(*entity)
            .map_err(|e| ImportError::from_clear(*entity, e))?;
        tracing::debug!(target: "recordbookd", event = "import_cleared", entity = %entity);
        progress.emit(PROGRESS_START + scaled(idx + 1, order.len(), PROGRESS_WIPED - PROGRESS_START));
    }
    Ok(())
}

fn insert_entity(
    store: &dyn RecordStore,
    entity: Entity,
    rows: &[Record],
    policy: InsertPolicy,
) -> Result<EntityOutcome, ImportError> {
    let mut outcome = EntityOutcome {
        received: rows.len() as u64,
        ..EntityOutcome::default()
    };
    for (index, record) in rows.iter().enumerate() {
        match store.add(entity, record) {
            Ok(_) => outcome.inserted += 1,
            Err(StoreError::Unavailable(msg)) => {
                return Err(ImportError::StorageUnavailable(msg));
            }
            Err(source) => {
                tracing::warn!(
                    target: "recordbookd",
                    event = "import_record_rejected",
                    entity = %entity,
                    index,
                    error = %source
                );
                if policy == InsertPolicy::AbortOnFirstError {
                    return Err(ImportError::RecordInsert {
                        entity,
                        index,
                        source,
                    });
                }
                outcome.failed += 1;
                if outcome.errors.len() < MAX_ERRORS_PER_ENTITY {
                    outcome.errors.push(RecordFailure {
                        index,
                        message: source.to_string(),
                    });
                }
            }
        }
    }
    Ok(outcome)
}
