use std::collections::HashSet;
use std::fmt::{self, Write};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::info;

use crate::core::BindingError;
use crate::dataset::Dataset;
use crate::eval::binding::BoundMetric;
use crate::eval::modules::{InputSource, Module};
use crate::eval::results::{Sample, TOOL_PREFIX};

/// The dependency structure induced by module inputs: module→module edges
/// and dataset-field→module edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub edges: Vec<(String, String)>,
    pub dataset_edges: Vec<(String, String)>,
}

/// A validated set of modules over a dataset. Constructed once, never
/// mutated.
///
/// Construction checks that every input reference resolves inside the
/// pipeline or the dataset, that module names are unique, and that a module
/// binding a dataset field agrees with the field's declared type origin.
/// Acyclicity is not enforced: recursive agent modules opt in via
/// `is_recursive` and own their termination.
pub struct Pipeline {
    dataset: Dataset,
    modules: IndexMap<String, Module>,
    graph: Graph,
}

impl Pipeline {
    pub fn new(modules: Vec<Module>, dataset: Dataset) -> Result<Self, BindingError> {
        let mut nodes: IndexMap<String, Module> = IndexMap::new();
        for module in modules {
            if module.name.is_empty() {
                return Err(BindingError::EmptyModuleName);
            }
            validate_attachments(&module)?;
            if nodes.contains_key(&module.name) {
                return Err(BindingError::DuplicateModule { name: module.name });
            }
            nodes.insert(module.name.clone(), module);
        }

        let mut graph = Graph::default();
        for module in nodes.values() {
            for input in &module.inputs {
                match input {
                    InputSource::Module(name) => {
                        if !nodes.contains_key(name) {
                            return Err(BindingError::UnknownModule { name: name.clone() });
                        }
                        graph.edges.push((name.clone(), module.name.clone()));
                    }
                    InputSource::Field(field) => {
                        let declared = dataset.field(&field.name).ok_or_else(|| {
                            BindingError::UnknownField {
                                name: field.name.clone(),
                            }
                        })?;
                        if declared.type_hint.origin() != field.type_hint.origin() {
                            return Err(BindingError::FieldTypeMismatch {
                                field: field.name.clone(),
                                bound: field.type_hint.to_string(),
                                declared: declared.type_hint.to_string(),
                            });
                        }
                        graph
                            .dataset_edges
                            .push((field.name.clone(), module.name.clone()));
                    }
                }
            }
            if let Some(agent) = &module.agent {
                if let Some(reference) = &agent.reference_tool_calls {
                    if dataset.field(&reference.name).is_none() {
                        return Err(BindingError::UnknownField {
                            name: reference.name.clone(),
                        });
                    }
                }
            }
        }

        info!(
            modules = nodes.len(),
            records = dataset.len(),
            "pipeline constructed"
        );
        Ok(Self {
            dataset,
            modules: nodes,
            graph,
        })
    }

    /// A pipeline of one module over the dataset, the common shape for
    /// evaluating raw data without a staged system.
    pub fn single_module(module: Module, dataset: Dataset) -> Result<Self, BindingError> {
        Self::new(vec![module], dataset)
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn module(&self, name: &str) -> Result<&Module, BindingError> {
        self.modules.get(name).ok_or_else(|| BindingError::UnknownModule {
            name: name.to_string(),
        })
    }

    /// Looks up an attached metric by module and metric name.
    pub fn metric(&self, module: &str, metric: &str) -> Result<&BoundMetric, BindingError> {
        self.module(module)?
            .metrics
            .iter()
            .find(|m| m.name() == metric)
            .ok_or_else(|| BindingError::UnknownMetric {
                module: module.to_string(),
                metric: metric.to_string(),
            })
    }

    /// One empty sample slot in this pipeline's shape: the type-default for
    /// every module output, plus an empty tool trace for agent modules.
    pub fn empty_sample(&self) -> Sample {
        let mut sample = Sample::new();
        for module in self.modules.values() {
            sample.insert(module.name.clone(), module.empty_output());
            if module.is_agent() {
                sample.insert(
                    format!("{TOOL_PREFIX}{}", module.name),
                    Value::Array(Vec::new()),
                );
            }
        }
        sample
    }

    /// Mermaid flowchart of the pipeline: the dataset as root, modules as
    /// nodes, tests as annotated leaves.
    pub fn graph_repr(&self) -> String {
        self.render_graph(None)
    }

    /// [`graph_repr`](Pipeline::graph_repr) with each test leaf annotated
    /// with its pass/fail outcome.
    pub fn test_graph(&self, outcomes: &crate::eval::results::TestResults) -> String {
        self.render_graph(Some(outcomes))
    }

    fn render_graph(&self, outcomes: Option<&crate::eval::results::TestResults>) -> String {
        let mut out = String::from("flowchart TD\n");
        let _ = writeln!(out, "    dataset[(dataset)]");
        let mut rooted: HashSet<&str> = HashSet::new();
        for (field, module) in &self.graph.dataset_edges {
            let _ = writeln!(out, "    dataset -->|{field}| {module}");
            rooted.insert(module);
        }
        for (from, to) in &self.graph.edges {
            let _ = writeln!(out, "    {from} --> {to}");
            rooted.insert(to);
        }
        for module in self.modules.values() {
            if !rooted.contains(module.name.as_str()) {
                let _ = writeln!(out, "    dataset --> {}", module.name);
            }
            for test in &module.tests {
                let label = match outcomes
                    .and_then(|o| o.results.get(&module.name))
                    .and_then(|tests| tests.get(&test.name()))
                {
                    Some(true) => format!("{} PASS", test.name()),
                    Some(false) => format!("{} FAIL", test.name()),
                    None => test.name(),
                };
                let _ = writeln!(
                    out,
                    "    {} -.-> {}_{}{{{{{label}}}}}",
                    module.name,
                    module.name,
                    test.name(),
                );
            }
        }
        out
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("records", &self.dataset.len())
            .field("graph", &self.graph)
            .finish()
    }
}

fn validate_attachments(module: &Module) -> Result<(), BindingError> {
    let mut metrics = HashSet::new();
    for metric in &module.metrics {
        if !metrics.insert(metric.name()) {
            return Err(BindingError::DuplicateMetric {
                module: module.name.clone(),
                metric: metric.name(),
            });
        }
    }
    let mut tests = HashSet::new();
    for test in &module.tests {
        if !tests.insert(test.name()) {
            return Err(BindingError::DuplicateTest {
                module: module.name.clone(),
                test: test.name(),
            });
        }
    }
    Ok(())
}
