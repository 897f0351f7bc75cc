use std::collections::HashMap;

use serde_json::Value;

use crate::catalog::Entity;

/// A loosely-typed row as it travels through import and export.
pub type Record = serde_json::Map<String, Value>;

/// Lowercase column name -> canonical column name for one entity.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    columns: &'static [&'static str],
    by_lower: HashMap<String, &'static str>,
}

impl ColumnIndex {
    pub fn new(entity: Entity) -> Self {
        Self::from_columns(entity.columns())
    }

    fn from_columns(columns: &'static [&'static str]) -> Self {
        let by_lower = columns
            .iter()
            .map(|c| (c.to_lowercase(), *c))
            .collect::<HashMap<_, _>>();
        Self { columns, by_lower }
    }

    pub fn empty() -> Self {
        Self::from_columns(&[])
    }

    pub fn canonical(&self, key: &str) -> Option<&'static str> {
        self.by_lower.get(&key.to_lowercase()).copied()
    }

    /// Project `raw` onto the whitelist. Columns are visited in declared
    /// order and take the first source key that lowercases to them.
    pub fn project(&self, raw: &Record) -> Record {
        let mut out = Record::new();
        for column in self.columns {
            let hit = raw
                .iter()
                .find(|(key, _)| self.canonical(key) == Some(*column));
            if let Some((_, value)) = hit {
                if !value.is_null() {
                    out.insert((*column).to_string(), value.clone());
                }
            }
        }
        out
    }

    /// Like [`ColumnIndex::project`], but a record with no recognised column
    /// comes back untouched so the store can decide what to do with it.
    pub fn sanitize(&self, raw: &Record) -> Record {
        let cleaned = self.project(raw);
        if cleaned.is_empty() {
            raw.clone()
        } else {
            cleaned
        }
    }
}

pub fn sanitize(entity: Entity, raw: &Record) -> Record {
    ColumnIndex::new(entity).sanitize(raw)
}

/// String-keyed variant; unknown entity names have no whitelist and pass
/// records through.
pub fn sanitize_named(entity: &str, raw: &Record) -> Record {
    match Entity::parse(entity) {
        Some(e) => sanitize(e, raw),
        None => ColumnIndex::empty().sanitize(raw),
    }
}

/// Sanitize a batch with a single index build.
pub fn sanitize_all(entity: Entity, raws: &[Record]) -> Vec<Record> {
    let index = ColumnIndex::new(entity);
    raws.iter().map(|r| index.sanitize(r)).collect()
}
