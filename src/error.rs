use thiserror::Error;

use crate::catalog::Entity;
use crate::decode::DecodeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported import format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse {member}: {source}")]
    Parse {
        member: String,
        #[source]
        source: DecodeError,
    },
    #[error("{entity} record #{index} rejected: {source}")]
    RecordInsert {
        entity: Entity,
        index: usize,
        #[source]
        source: StoreError,
    },
    #[error("record store unavailable: {0}")]
    StorageUnavailable(String),
    #[error("failed to clear {entity}: {source}")]
    Storage {
        entity: Entity,
        #[source]
        source: StoreError,
    },
    #[error("{actor} is not allowed to replace workspace data")]
    Forbidden { actor: String },
}

impl ImportError {
    /// Stable code surfaced over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::UnsupportedFormat(_) => "unsupported_format",
            ImportError::Parse { .. } => "parse_failed",
            ImportError::RecordInsert { .. } => "record_insert_failed",
            ImportError::StorageUnavailable(_) => "storage_unavailable",
            ImportError::Storage { .. } => "db_delete_failed",
            ImportError::Forbidden { .. } => "forbidden",
        }
    }

    pub(crate) fn from_clear(entity: Entity, source: StoreError) -> Self {
        match source {
            StoreError::Unavailable(msg) => ImportError::StorageUnavailable(msg),
            other => ImportError::Storage {
                entity,
                source: other,
            },
        }
    }
}
