use std::fmt;
use std::sync::Arc;

use bon::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TypeHint;
use crate::dataset::DatasetField;
use crate::eval::binding::BoundMetric;
use crate::eval::tests::Test;

/// Where a module reads its input from: a dataset column or the output of
/// another module in the same pipeline.
#[derive(Debug, Clone)]
pub enum InputSource {
    Field(DatasetField),
    Module(String),
}

impl InputSource {
    pub fn module(name: impl Into<String>) -> Self {
        InputSource::Module(name.into())
    }
}

impl From<DatasetField> for InputSource {
    fn from(field: DatasetField) -> Self {
        InputSource::Field(field)
    }
}

impl From<&DatasetField> for InputSource {
    fn from(field: &DatasetField) -> Self {
        InputSource::Field(field.clone())
    }
}

/// A callable an agent module may invoke while producing its output.
#[derive(Debug, Clone, Builder)]
pub struct Tool {
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub args: IndexMap<String, TypeHint>,
    pub out_type: TypeHint,
    #[builder(into)]
    pub description: Option<String>,
}

/// One recorded tool invocation: the tool name and the arguments it was
/// called with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub kwargs: IndexMap<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kwargs: IndexMap::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// Extra shape carried by agent modules: the tools they may call, an
/// optional ground-truth field holding reference tool calls, and whether the
/// module may appear in a cycle. Recursion is the caller's responsibility;
/// the engine only prepares bindings.
#[derive(Builder)]
pub struct AgentSpec {
    #[builder(default)]
    pub tools: Vec<Tool>,
    pub reference_tool_calls: Option<DatasetField>,
    #[builder(default = false)]
    pub is_recursive: bool,
}

/// A named pipeline stage with typed input and output and optional attached
/// metrics and tests.
///
/// The output type is used only to initialize empty sample slots; the engine
/// never runs the stage itself, it binds externally produced values.
///
/// ```ignore
/// let retriever = Module::builder()
///     .name("retriever")
///     .inputs(vec![dataset.field("question").unwrap().into()])
///     .output_type(TypeHint::list_of(TypeHint::Str))
///     .build();
/// ```
#[derive(Builder)]
pub struct Module {
    #[builder(into)]
    pub name: String,
    #[builder(default)]
    pub inputs: Vec<InputSource>,
    pub output_type: TypeHint,
    #[builder(into)]
    pub description: Option<String>,
    /// Metrics evaluated against this module's output. Names must be unique
    /// within the module.
    #[builder(default)]
    pub metrics: Vec<BoundMetric>,
    /// Boolean gates over the merged per-sample metric values.
    #[builder(default)]
    pub tests: Vec<Arc<dyn Test>>,
    pub agent: Option<AgentSpec>,
}

impl Module {
    /// Default value for an empty sample slot of this module.
    pub fn empty_output(&self) -> Value {
        self.output_type.default_value()
    }

    pub fn is_agent(&self) -> bool {
        self.agent.is_some()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output_type", &self.output_type)
            .field("metrics", &self.metrics.len())
            .field("tests", &self.tests.len())
            .field("agent", &self.agent.is_some())
            .finish()
    }
}
