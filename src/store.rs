use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, Row};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::Entity;
use crate::sanitize::Record;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage rejected the record: {0}")]
    Storage(String),
    #[error("{entity} record {id} not found")]
    NotFound { entity: Entity, id: i64 },
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        let unavailable = match &e {
            rusqlite::Error::SqliteFailure(f, _) => matches!(
                f.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::PermissionDenied
                    | ErrorCode::DiskFull
            ),
            _ => false,
        };
        if unavailable {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Storage(e.to_string())
        }
    }
}

/// Per-collection record storage the import engine writes through.
pub trait RecordStore {
    /// Reachability check run before anything destructive.
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get_all(&self, entity: Entity) -> Result<Vec<Record>, StoreError>;

    fn get_one(&self, entity: Entity, id: i64) -> Result<Option<Record>, StoreError>;

    /// Insert one record and return it as stored, id assigned.
    fn add(&self, entity: Entity, record: &Record) -> Result<Record, StoreError>;

    /// Overwrite the columns present in `record` on the row with its `id`.
    fn update(&self, entity: Entity, record: &Record) -> Result<Record, StoreError>;

    fn clear(&self, entity: Entity) -> Result<(), StoreError>;
}

pub fn record_id(record: &Record) -> Option<i64> {
    match record.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(Value::from(i)),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Some(Value::String(String::from_utf8_lossy(t).into_owned()))
        }
    }
}

fn row_to_record(row: &Row<'_>, names: &[String]) -> rusqlite::Result<Record> {
    let mut out = Record::new();
    for (idx, name) in names.iter().enumerate() {
        if let Some(v) = from_sql(row.get_ref(idx)?) {
            out.insert(name.clone(), v);
        }
    }
    Ok(out)
}

/// `RecordStore` over the workspace database (or any transaction on it).
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn select(&self, entity: Entity, id: Option<i64>) -> Result<Vec<Record>, StoreError> {
        let table = quote_ident(entity.as_str());
        let sql = match id {
            Some(_) => format!("SELECT * FROM {table} WHERE id = ?"),
            None => format!("SELECT * FROM {table} ORDER BY id"),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map(params_from_iter(id), |row| row_to_record(row, &names))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RecordStore for SqliteStore<'_> {
    fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| match StoreError::from(e) {
                StoreError::Storage(msg) => StoreError::Unavailable(msg),
                other => other,
            })
    }

    fn get_all(&self, entity: Entity) -> Result<Vec<Record>, StoreError> {
        self.select(entity, None)
    }

    fn get_one(&self, entity: Entity, id: i64) -> Result<Option<Record>, StoreError> {
        Ok(self.select(entity, Some(id))?.into_iter().next())
    }

    fn add(&self, entity: Entity, record: &Record) -> Result<Record, StoreError> {
        // A blank id (typical of CSV exports) means "assign one".
        let columns: Vec<(&String, &Value)> = record
            .iter()
            .filter(|(k, v)| !(k.as_str() == "id" && v.as_str().map(str::trim) == Some("")))
            .collect();
        let table = quote_ident(entity.as_str());
        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let names = columns
                .iter()
                .map(|(k, _)| quote_ident(k))
                .collect::<Vec<_>>()
                .join(", ");
            let marks = vec!["?"; columns.len()].join(", ");
            format!("INSERT INTO {table} ({names}) VALUES ({marks})")
        };
        self.conn.execute(
            &sql,
            params_from_iter(columns.iter().map(|(_, v)| to_sql(v))),
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_one(entity, id)?
            .ok_or(StoreError::NotFound { entity, id })
    }

    fn update(&self, entity: Entity, record: &Record) -> Result<Record, StoreError> {
        let id = record_id(record)
            .ok_or_else(|| StoreError::Storage(format!("{entity} update requires an id")))?;
        let columns: Vec<(&String, &Value)> =
            record.iter().filter(|(k, _)| k.as_str() != "id").collect();
        if !columns.is_empty() {
            let sets = columns
                .iter()
                .map(|(k, _)| format!("{} = ?", quote_ident(k)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {} SET {sets} WHERE id = ?",
                quote_ident(entity.as_str())
            );
            let mut params: Vec<SqlValue> = columns.iter().map(|(_, v)| to_sql(v)).collect();
            params.push(SqlValue::Integer(id));
            let changed = self.conn.execute(&sql, params_from_iter(params))?;
            if changed == 0 {
                return Err(StoreError::NotFound { entity, id });
            }
        }
        self.get_one(entity, id)?
            .ok_or(StoreError::NotFound { entity, id })
    }

    fn clear(&self, entity: Entity) -> Result<(), StoreError> {
        self.conn
            .execute(&format!("DELETE FROM {}", quote_ident(entity.as_str())), [])?;
        Ok(())
    }
}
