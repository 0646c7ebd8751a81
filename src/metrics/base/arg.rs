use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TypeHint;

/// A declared metric input: the type the metric expects for one keyword
/// argument, plus binding metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Arg {
    #[serde(rename = "type")]
    pub type_hint: TypeHint,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default)]
    pub is_ground_truth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_true() -> bool {
    true
}

impl Default for Arg {
    fn default() -> Self {
        Self {
            type_hint: TypeHint::Str,
            description: String::new(),
            is_required: true,
            is_ground_truth: false,
            default: None,
        }
    }
}

impl Arg {
    pub fn new(type_hint: TypeHint) -> Self {
        Self {
            type_hint,
            ..Self::default()
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self, default: Value) -> Self {
        self.is_required = false;
        self.default = Some(default);
        self
    }

    pub fn ground_truth(mut self) -> Self {
        self.is_ground_truth = true;
        self
    }
}

/// One entry of a metric's result schema: the declared type of an output
/// field, with optional numeric limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricField {
    #[serde(rename = "type")]
    pub type_hint: TypeHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetricField {
    pub fn new(type_hint: TypeHint) -> Self {
        Self {
            type_hint,
            limits: None,
            description: None,
        }
    }

    pub fn bounded(mut self, low: f64, high: f64) -> Self {
        self.limits = Some((low, high));
        self
    }
}
