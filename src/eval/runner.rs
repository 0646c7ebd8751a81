use indexmap::IndexMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::core::BindingError;
use crate::dataset::Dataset;
use crate::eval::binding::{BoundMetric, Placeholder};
use crate::eval::modules::Module;
use crate::eval::pipeline::Pipeline;
use crate::eval::results::{MetricsResults, PipelineResults, Sample, TestResults, TOOL_PREFIX};
use crate::metrics::Columns;

/// What the runner evaluates metrics against.
pub enum EvalData {
    /// Empty results in the pipeline shape, every slot the type-default.
    Default,
    /// An existing run, used as-is.
    Results(PipelineResults),
    /// The dataset records themselves as per-module payloads.
    Dataset,
    /// A uid-keyed log of module outputs, converted in dataset order.
    Logs(IndexMap<String, Sample>),
}

/// Drives metrics and tests over a pipeline. Binding failures abort before
/// any metric executes; per-sample metric failures are contained by the
/// batch executor.
pub struct EvaluationRunner<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> EvaluationRunner<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Runs every attached metric of every module, one batch per metric,
    /// sequential across metrics so per-sample merging stays deterministic.
    pub fn evaluate(&self, input: EvalData) -> Result<MetricsResults, BindingError> {
        crate::utils::track_event("evaluate");
        let results = self.materialize(input)?;
        if results.is_empty() {
            return Err(BindingError::NoSamples);
        }

        let mut metrics_results = MetricsResults::default();
        for module in self.pipeline.modules() {
            if module.metrics.is_empty() {
                continue;
            }
            let mut per_metric = IndexMap::new();
            for metric in &module.metrics {
                let columns =
                    prepare(self.pipeline.dataset(), &results, module, metric)?;
                info!(
                    module = %module.name,
                    metric = %metric.name(),
                    samples = results.len(),
                    "running metric"
                );
                per_metric.insert(metric.name(), metric.metric.batch(&columns));
            }
            metrics_results
                .samples
                .insert(module.name.clone(), per_metric);
        }
        Ok(metrics_results)
    }

    /// Runs every attached test over the merged per-sample metric values.
    /// Tests never abort the run: a failing test body counts as `false`.
    pub fn test(&self, metrics_results: &MetricsResults) -> TestResults {
        crate::utils::track_event("test");
        let merged = metrics_results.results();
        let mut test_results = TestResults::default();
        for module in self.pipeline.modules() {
            if module.tests.is_empty() {
                continue;
            }
            let empty = Vec::new();
            let samples = merged.get(&module.name).unwrap_or(&empty);
            let mut per_test = IndexMap::new();
            for test in &module.tests {
                let passed = match test.run(samples) {
                    Ok(passed) => passed,
                    Err(err) => {
                        warn!(
                            module = %module.name,
                            test = %test.name(),
                            error = %err,
                            "test raised, recording failure"
                        );
                        false
                    }
                };
                per_test.insert(test.name(), passed);
            }
            test_results.results.insert(module.name.clone(), per_test);
        }
        test_results
    }

    fn materialize(&self, input: EvalData) -> Result<PipelineResults, BindingError> {
        Ok(match input {
            EvalData::Default => PipelineResults::from_pipeline(self.pipeline),
            EvalData::Results(results) => results,
            EvalData::Dataset => PipelineResults::from_dataset(self.pipeline),
            EvalData::Logs(logs) => PipelineResults::from_logs(self.pipeline, &logs)?,
        })
    }
}

/// Builds the column-aligned kwargs for one metric: every placeholder in the
/// plan resolved against the dataset and the results. Without a plan, falls
/// back to spreading the owner module's output fields (or the raw sample
/// fields) as columns.
pub fn prepare(
    dataset: &Dataset,
    results: &PipelineResults,
    module: &Module,
    metric: &BoundMetric,
) -> Result<Columns, BindingError> {
    match &metric.plan {
        Some(plan) => plan
            .iter()
            .map(|(arg, placeholder)| {
                Ok((
                    arg.clone(),
                    resolve(placeholder, dataset, results, module)?,
                ))
            })
            .collect(),
        None => fallback_columns(results, module),
    }
}

fn resolve(
    placeholder: &Placeholder,
    dataset: &Dataset,
    results: &PipelineResults,
    owner: &Module,
) -> Result<Vec<Value>, BindingError> {
    match placeholder {
        Placeholder::DatasetField { name } => Ok(dataset.column(name)?),
        Placeholder::ModuleOutput { module, selector } => {
            let target = module.as_deref().unwrap_or(&owner.name);
            slot_column(results, target, selector.as_deref())
        }
        Placeholder::CalledTools { module, selector } => {
            let target = module.as_deref().unwrap_or(&owner.name);
            slot_column(results, &format!("{TOOL_PREFIX}{target}"), selector.as_deref())
        }
        Placeholder::Lambda { func } => results
            .samples()
            .iter()
            .enumerate()
            .map(|(index, sample)| match func(sample) {
                Some(value) => Ok(value),
                // The sample lacks what the function needs; retry against
                // the dataset record with the same uid.
                None => {
                    let uid = results.uids().get(index).cloned().unwrap_or_default();
                    let record =
                        dataset
                            .record_by_uid(&uid)
                            .ok_or(BindingError::UnknownUid { uid })?;
                    func(record).ok_or(BindingError::MissingSlot {
                        module: owner.name.clone(),
                        index,
                    })
                }
            })
            .collect(),
    }
}

fn slot_column(
    results: &PipelineResults,
    slot: &str,
    selector: Option<&(dyn Fn(&Value) -> Value + Send + Sync)>,
) -> Result<Vec<Value>, BindingError> {
    results
        .samples()
        .iter()
        .enumerate()
        .map(|(index, sample)| {
            let value = sample.get(slot).ok_or_else(|| BindingError::MissingSlot {
                module: slot.strip_prefix(TOOL_PREFIX).unwrap_or(slot).to_string(),
                index,
            })?;
            Ok(match selector {
                Some(select) => select(value),
                None => value.clone(),
            })
        })
        .collect()
}

/// Plan-less binding: when the module's slot holds objects, their fields
/// become columns; otherwise the raw sample fields do.
fn fallback_columns(results: &PipelineResults, module: &Module) -> Result<Columns, BindingError> {
    let mut columns = Columns::new();
    let object_slots = results
        .samples()
        .iter()
        .all(|sample| matches!(sample.get(&module.name), Some(Value::Object(_))));
    for sample in results.samples() {
        let fields: Vec<(String, Value)> = if object_slots {
            match sample.get(&module.name) {
                Some(Value::Object(map)) => {
                    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                }
                _ => Vec::new(),
            }
        } else {
            sample.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (key, value) in fields {
            columns.entry(key).or_default().push(value);
        }
    }
    Ok(columns)
}
