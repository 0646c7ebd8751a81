use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::TypeHint;

/// A named, typed handle to a dataset column, used as an input binding for
/// pipeline modules and metric plans.
///
/// Two fields are equal when their names are equal; the type and description
/// are descriptive metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_hint: TypeHint,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_ground_truth: bool,
}

impl DatasetField {
    pub fn new(name: impl Into<String>, type_hint: TypeHint) -> Self {
        Self {
            name: name.into(),
            type_hint,
            description: String::new(),
            is_ground_truth: false,
        }
    }

    pub fn ground_truth(mut self) -> Self {
        self.is_ground_truth = true;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl PartialEq for DatasetField {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DatasetField {}

impl Hash for DatasetField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
