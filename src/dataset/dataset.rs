use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::info;

use crate::core::{DatasetError, TypeHint};
use crate::dataset::{DatasetField, Manifest};

pub const MANIFEST_FILE: &str = "manifest.yaml";
pub const DATA_FILE: &str = "dataset.jsonl";

/// One dataset record: field name to JSON value, insertion-ordered.
pub type Record = IndexMap<String, Value>;

/// A finite ordered sequence of records plus the manifest that types them.
/// Immutable after load.
#[derive(Debug, Clone)]
pub struct Dataset {
    manifest: Manifest,
    records: Vec<Record>,
    fields: Vec<DatasetField>,
}

impl Dataset {
    /// Loads `manifest.yaml` + `dataset.jsonl` from a directory and validates
    /// every record against the manifest.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let manifest = Manifest::from_yaml(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        let records = read_jsonl(&fs::read_to_string(dir.join(DATA_FILE))?)?;
        info!(
            dataset = %manifest.name,
            records = records.len(),
            "loaded dataset"
        );
        Self::new(manifest, records)
    }

    /// Builds a dataset from in-memory records, inferring the manifest from
    /// the first record. Inconsistent types across records fail loading.
    pub fn from_records(records: Vec<Record>) -> Result<Self, DatasetError> {
        let manifest = Manifest::infer(&records)?;
        Self::new(manifest, records)
    }

    pub fn new(manifest: Manifest, records: Vec<Record>) -> Result<Self, DatasetError> {
        if records.is_empty() {
            return Err(DatasetError::Empty);
        }
        for (index, record) in records.iter().enumerate() {
            for (name, spec) in &manifest.fields {
                let value = record.get(name).ok_or_else(|| DatasetError::MissingField {
                    field: name.clone(),
                    index,
                })?;
                if !spec.type_hint.matches(value) {
                    return Err(DatasetError::TypeConflict {
                        field: name.clone(),
                        declared: spec.type_hint.to_string(),
                        found: TypeHint::infer(value).to_string(),
                        index,
                    });
                }
            }
        }
        let fields = manifest
            .fields
            .iter()
            .map(|(name, spec)| DatasetField {
                name: name.clone(),
                type_hint: spec.type_hint.clone(),
                description: spec.description.clone(),
                is_ground_truth: spec.ground_truth,
            })
            .collect();
        Ok(Self {
            manifest,
            records,
            fields,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn fields(&self) -> &[DatasetField] {
        &self.fields
    }

    /// Name-addressable field lookup; the returned handle is what module
    /// inputs and metric plans bind against.
    pub fn field(&self, name: &str) -> Option<&DatasetField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The full column for one field, in record order.
    pub fn column(&self, name: &str) -> Result<Vec<Value>, DatasetError> {
        if self.field(name).is_none() {
            return Err(DatasetError::UnknownField {
                field: name.to_string(),
            });
        }
        Ok(self
            .records
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect())
    }

    /// Per-sample identifier: the `uid` field when present, else the
    /// positional index.
    pub fn uid(&self, index: usize) -> String {
        self.records
            .get(index)
            .and_then(|r| r.get("uid"))
            .map(value_as_uid)
            .unwrap_or_else(|| index.to_string())
    }

    /// Finds the record whose uid matches, falling back to positional
    /// indices for datasets without a `uid` field.
    pub fn record_by_uid(&self, uid: &str) -> Option<&Record> {
        self.records
            .iter()
            .enumerate()
            .find(|(index, record)| {
                record
                    .get("uid")
                    .map(|v| value_as_uid(v) == uid)
                    .unwrap_or_else(|| index.to_string() == uid)
            })
            .map(|(_, record)| record)
    }

    /// Writes the dataset back to disk in the same two-file layout it loads
    /// from. Round-trips bitwise for data loaded through [`Dataset::load`].
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), DatasetError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        fs::write(dir.join(MANIFEST_FILE), self.manifest.to_yaml()?)?;
        let mut out = String::new();
        for record in &self.records {
            // serde_json::to_string on IndexMap cannot fail for JSON values
            out.push_str(&serde_json::to_string(record).map_err(std::io::Error::other)?);
            out.push('\n');
        }
        fs::write(dir.join(DATA_FILE), out)?;
        Ok(())
    }
}

fn value_as_uid(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_jsonl(text: &str) -> Result<Vec<Record>, DatasetError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line, content)| {
            serde_json::from_str(content).map_err(|source| DatasetError::MalformedRecord {
                line: line + 1,
                source,
            })
        })
        .collect()
}
