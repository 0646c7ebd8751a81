use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{DatasetError, TypeHint};

/// Per-field declaration inside a [`Manifest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub type_hint: TypeHint,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ground_truth: bool,
}

impl FieldSpec {
    pub fn new(type_hint: TypeHint) -> Self {
        Self {
            type_hint,
            description: String::new(),
            ground_truth: false,
        }
    }
}

fn default_format() -> String {
    "jsonl".to_string()
}

/// Sidecar metadata describing a dataset: one [`FieldSpec`] per column plus
/// free-form provenance strings. Serialized as `manifest.yaml` next to the
/// JSONL data file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub license: String,
    pub fields: IndexMap<String, FieldSpec>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, fields: IndexMap<String, FieldSpec>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            format: default_format(),
            license: String::new(),
            fields,
        }
    }

    /// Infers a manifest from the first record; later records are validated
    /// against it by the dataset loader.
    pub fn infer(records: &[IndexMap<String, Value>]) -> Result<Self, DatasetError> {
        let first = records.first().ok_or(DatasetError::Empty)?;
        let fields = first
            .iter()
            .map(|(name, value)| (name.clone(), FieldSpec::new(TypeHint::infer(value))))
            .collect();
        Ok(Manifest::new("inferred", fields))
    }

    pub fn from_yaml(text: &str) -> Result<Self, DatasetError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, DatasetError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
