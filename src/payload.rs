use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::catalog::{Entity, BUNDLE_MARKERS, INSERT_ORDER};
use crate::decode::{self, kind_of, ArchiveReader, DecodeError};
use crate::error::ImportError;
use crate::sanitize::{sanitize_all, Record};

/// Sanitized rows keyed by entity, ready for a replace.
pub type EntityRecords = BTreeMap<Entity, Vec<Record>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadShape {
    /// Archive with `<entity>.json` members.
    BundledArchive,
    /// Archive with per-entity JSON/CSV files found by candidate name.
    IndividualArchive,
    /// `{ "data": { <entity>: [...] } }`
    StructuredDocument,
    /// `{ <entity>: [...] }`
    LegacyDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Archive,
    Document,
}

/// Pick the container from the file name, or the content type when no name
/// is known.
pub fn container_for(file_name: Option<&str>, content_type: Option<&str>) -> Result<Container, ImportError> {
    if let Some(name) = file_name {
        let lowered = name.trim().to_ascii_lowercase();
        if lowered.ends_with(".zip") {
            return Ok(Container::Archive);
        }
        if lowered.ends_with(".json") {
            return Ok(Container::Document);
        }
        return Err(ImportError::UnsupportedFormat(format!(
            "{name}: use a .zip or .json snapshot"
        )));
    }
    let mime = content_type
        .map(|c| c.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "application/zip" | "application/x-zip-compressed" => Ok(Container::Archive),
        "application/json" | "text/json" => Ok(Container::Document),
        "" => Err(ImportError::UnsupportedFormat(
            "no file name or content type given".to_string(),
        )),
        other => Err(ImportError::UnsupportedFormat(other.to_string())),
    }
}

/// Raw rows for one entity plus where they came from.
#[derive(Debug, Clone, Default)]
pub struct EntityBatch {
    pub source: Option<String>,
    pub records: Vec<Record>,
    pub decode_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DecodedPayload {
    pub shape: PayloadShape,
    pub batches: BTreeMap<Entity, EntityBatch>,
}

impl DecodedPayload {
    pub fn sanitized(&self) -> EntityRecords {
        self.batches
            .iter()
            .map(|(entity, batch)| (*entity, sanitize_all(*entity, &batch.records)))
            .collect()
    }

    pub fn decode_errors(&self) -> BTreeMap<Entity, String> {
        self.batches
            .iter()
            .filter_map(|(e, b)| b.decode_error.clone().map(|msg| (*e, msg)))
            .collect()
    }
}

/// Classify an upload and decode it into per-entity raw records. Only a
/// failure to read the container itself is an error; per-entity problems are
/// recorded on the batch.
pub fn decode_payload(
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> Result<DecodedPayload, ImportError> {
    let member = file_name.unwrap_or("upload").to_string();
    match container_for(file_name, content_type)? {
        Container::Archive => {
            let reader = ArchiveReader::open(bytes)
                .map_err(|source| ImportError::Parse { member, source })?;
            Ok(decode_archive(reader))
        }
        Container::Document => {
            let text = String::from_utf8(bytes).map_err(|_| ImportError::Parse {
                member: member.clone(),
                source: DecodeError::Utf8,
            })?;
            let value: Value =
                serde_json::from_str(decode::strip_bom(&text)).map_err(|e| ImportError::Parse {
                    member: member.clone(),
                    source: DecodeError::Json(e),
                })?;
            decode_document(&value).map_err(|source| ImportError::Parse { member, source })
        }
    }
}

pub fn archive_shape(reader: &ArchiveReader) -> PayloadShape {
    if BUNDLE_MARKERS.iter().any(|m| reader.contains(m)) {
        PayloadShape::BundledArchive
    } else {
        PayloadShape::IndividualArchive
    }
}

pub fn decode_archive(mut reader: ArchiveReader) -> DecodedPayload {
    let shape = archive_shape(&reader);
    let mut batches = BTreeMap::new();
    for entity in INSERT_ORDER {
        let batch = if shape == PayloadShape::BundledArchive && reader.contains(&entity.json_member()) {
            read_bundled_member(&mut reader, entity)
        } else {
            scan_candidates(&mut reader, entity)
        };
        batches.insert(entity, batch);
    }
    DecodedPayload { shape, batches }
}

fn read_bundled_member(reader: &mut ArchiveReader, entity: Entity) -> EntityBatch {
    let name = entity.json_member();
    let decoded = reader
        .member_text(&name)
        .and_then(|text| decode::decode_json_records(text.as_deref().unwrap_or("[]")));
    match decoded {
        Ok(records) => EntityBatch {
            source: Some(name),
            records,
            decode_error: None,
        },
        Err(e) => {
            tracing::warn!(
                target: "recordbookd",
                event = "import_member_parse_failed",
                entity = %entity,
                member = %name,
                error = %e
            );
            EntityBatch {
                source: Some(name),
                records: Vec::new(),
                decode_error: Some(e.to_string()),
            }
        }
    }
}

/// Try each candidate file; the first one that decodes to at least one row
/// wins.
fn scan_candidates(reader: &mut ArchiveReader, entity: Entity) -> EntityBatch {
    let mut last_error = None;
    for name in entity.candidate_files() {
        if !reader.contains(&name) {
            continue;
        }
        let decoded = match reader.member(&name) {
            Ok(Some(bytes)) => decode::decode_member(&name, &bytes),
            Ok(None) => continue,
            Err(e) => Some(Err(e)),
        };
        match decoded {
            Some(Ok(records)) if !records.is_empty() => {
                return EntityBatch {
                    source: Some(name),
                    records,
                    decode_error: None,
                };
            }
            Some(Ok(_)) | None => {
                tracing::debug!(target: "recordbookd", event = "import_member_empty", entity = %entity, member = %name);
            }
            Some(Err(e)) => {
                tracing::warn!(
                    target: "recordbookd",
                    event = "import_member_parse_failed",
                    entity = %entity,
                    member = %name,
                    error = %e
                );
                last_error = Some(format!("{name}: {e}"));
            }
        }
    }
    EntityBatch {
        source: None,
        records: Vec::new(),
        decode_error: last_error,
    }
}

pub fn document_shape(value: &Value) -> PayloadShape {
    match value.get("data") {
        Some(Value::Object(_)) => PayloadShape::StructuredDocument,
        _ => PayloadShape::LegacyDocument,
    }
}

pub fn decode_document(value: &Value) -> Result<DecodedPayload, DecodeError> {
    let shape = document_shape(value);
    let root = match shape {
        PayloadShape::StructuredDocument => value.get("data"),
        _ => Some(value),
    };
    let Some(Value::Object(root)) = root else {
        return Err(DecodeError::NotAnObject {
            found: kind_of(value),
        });
    };

    let mut batches = BTreeMap::new();
    for entity in INSERT_ORDER {
        let batch = match root.get(entity.as_str()) {
            Some(Value::Array(items)) => EntityBatch {
                source: Some(entity.as_str().to_string()),
                records: decode::records_from_array(items),
                decode_error: None,
            },
            Some(other) => {
                let err = DecodeError::NotAnArray {
                    found: kind_of(other),
                };
                tracing::warn!(
                    target: "recordbookd",
                    event = "import_section_skipped",
                    entity = %entity,
                    error = %err
                );
                EntityBatch {
                    source: Some(entity.as_str().to_string()),
                    records: Vec::new(),
                    decode_error: Some(err.to_string()),
                }
            }
            None => EntityBatch::default(),
        };
        batches.insert(entity, batch);
    }
    Ok(DecodedPayload { shape, batches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_of(members: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            zip.start_file(*name, FileOptions::default()).expect("start");
            zip.write_all(body.as_bytes()).expect("write");
        }
        zip.finish().expect("finish").into_inner()
    }

    #[test]
    fn extension_decides_container() {
        assert_eq!(container_for(Some("Backup.ZIP"), None).unwrap(), Container::Archive);
        assert_eq!(container_for(Some("db.json"), None).unwrap(), Container::Document);
        assert!(matches!(
            container_for(Some("db.xlsx"), Some("application/json")),
            Err(ImportError::UnsupportedFormat(_))
        ));
        assert_eq!(
            container_for(None, Some("application/json; charset=utf-8")).unwrap(),
            Container::Document
        );
        assert!(container_for(None, None).is_err());
    }

    #[test]
    fn data_object_means_structured() {
        assert_eq!(
            document_shape(&json!({ "data": { "students": [] } })),
            PayloadShape::StructuredDocument
        );
        assert_eq!(
            document_shape(&json!({ "data": [1], "students": [] })),
            PayloadShape::LegacyDocument
        );
    }

    #[test]
    fn legacy_document_reads_top_level_sections() {
        let decoded = decode_document(&json!({
            "students": [{ "RollNo": "S1" }],
            "faculty": "oops",
            "version": 3
        }))
        .expect("decode");
        assert_eq!(decoded.shape, PayloadShape::LegacyDocument);
        assert_eq!(decoded.batches[&Entity::Students].records.len(), 1);
        assert!(decoded.batches[&Entity::Faculty].decode_error.is_some());
        assert!(decoded.batches[&Entity::Classes].source.is_none());
        assert_eq!(
            Value::Object(decoded.sanitized()[&Entity::Students][0].clone()),
            json!({ "rollno": "S1" })
        );
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(matches!(
            decode_document(&json!([1, 2])),
            Err(DecodeError::NotAnObject { found: "array" })
        ));
    }

    #[test]
    fn bundled_archive_falls_back_per_entity() {
        let bytes = zip_of(&[
            ("students.json", r#"[{"rollno":"S1"}]"#),
            ("classes.csv", "code,name\nCS1,Intro\n"),
        ]);
        let decoded = decode_payload(Some("snap.zip"), None, bytes).expect("decode");
        assert_eq!(decoded.shape, PayloadShape::BundledArchive);
        let classes = &decoded.batches[&Entity::Classes];
        assert_eq!(classes.source.as_deref(), Some("classes.csv"));
        assert_eq!(classes.records[0].get("code"), Some(&json!("CS1")));
    }

    #[test]
    fn individual_archive_skips_empty_and_broken_candidates() {
        let bytes = zip_of(&[
            ("faculty.json", "[]"),
            ("faculty.csv", "facultyid\nF1\n"),
            ("academic_years.json", "{broken"),
            ("years.json", r#"[{"year":"2024"}]"#),
            ("settings.json", "nope"),
        ]);
        let decoded = decode_payload(Some("legacy.zip"), None, bytes).expect("decode");
        assert_eq!(decoded.shape, PayloadShape::IndividualArchive);
        assert_eq!(
            decoded.batches[&Entity::Faculty].source.as_deref(),
            Some("faculty.csv")
        );
        let years = &decoded.batches[&Entity::AcademicYears];
        assert_eq!(years.source.as_deref(), Some("years.json"));
        assert!(years.decode_error.is_none());
        assert!(decoded.batches[&Entity::Settings].decode_error.is_some());
        assert!(decoded.batches[&Entity::Students].records.is_empty());
    }

    #[test]
    fn broken_bundled_member_does_not_fall_back() {
        let bytes = zip_of(&[
            ("students.json", "[{"),
            ("students.csv", "rollno\nS1\n"),
        ]);
        let decoded = decode_payload(Some("snap.zip"), None, bytes).expect("decode");
        let students = &decoded.batches[&Entity::Students];
        assert!(students.records.is_empty());
        assert!(students.decode_error.is_some());
        assert_eq!(decoded.decode_errors().len(), 1);
    }

    #[test]
    fn unreadable_container_aborts() {
        assert!(matches!(
            decode_payload(Some("snap.zip"), None, b"PK?".to_vec()),
            Err(ImportError::Parse { .. })
        ));
        assert!(matches!(
            decode_payload(Some("snap.json"), None, b"{".to_vec()),
            Err(ImportError::Parse { .. })
        ));
    }
}
