use std::fs;
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::BindingError;
use crate::eval::pipeline::Pipeline;
use crate::metrics::MetricResult;

/// Slot prefix under which agent modules record their tool-call traces.
pub const TOOL_PREFIX: &str = "_tool__";

/// One per-record sample slot: module name to the value that module
/// produced.
pub type Sample = IndexMap<String, Value>;

/// Key under which the per-sample identifier is injected on disk.
pub const UID_KEY: &str = "__uid";

/// Ordered per-sample outputs of a pipeline run, one slot per dataset
/// record. Slots are created empty with the pipeline shape and filled
/// through the logger, or materialized from an existing run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResults {
    uids: Vec<String>,
    samples: Vec<Sample>,
}

impl PipelineResults {
    /// One empty slot per dataset record, every module output set to the
    /// type-default of its declared output type.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let dataset = pipeline.dataset();
        let uids = (0..dataset.len()).map(|i| dataset.uid(i)).collect();
        let samples = (0..dataset.len()).map(|_| pipeline.empty_sample()).collect();
        Self { uids, samples }
    }

    /// Treats dataset records themselves as sample slots. Used when the
    /// pipeline is a single module over raw data.
    pub fn from_dataset(pipeline: &Pipeline) -> Self {
        let dataset = pipeline.dataset();
        let uids = (0..dataset.len()).map(|i| dataset.uid(i)).collect();
        let samples = dataset.records().to_vec();
        Self { uids, samples }
    }

    /// Converts a uid-keyed log into results, preserving dataset order.
    /// Records absent from the log keep their empty slot; log uids that do
    /// not appear in the dataset fail.
    pub fn from_logs(
        pipeline: &Pipeline,
        logs: &IndexMap<String, Sample>,
    ) -> Result<Self, BindingError> {
        let mut results = Self::from_pipeline(pipeline);
        for (uid, sample) in logs {
            let index = results
                .uids
                .iter()
                .position(|u| u == uid)
                .ok_or_else(|| BindingError::UnknownUid { uid: uid.clone() })?;
            for (slot, value) in sample {
                results.samples[index].insert(slot.clone(), value.clone());
            }
        }
        Ok(results)
    }

    pub fn new(uids: Vec<String>, samples: Vec<Sample>) -> Self {
        Self { uids, samples }
    }

    pub fn uids(&self) -> &[String] {
        &self.uids
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// JSON-lines, each line one sample slot merged with its `__uid`.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut out = String::new();
        for (uid, sample) in self.uids.iter().zip(&self.samples) {
            let mut line = Sample::new();
            line.insert(UID_KEY.to_string(), Value::from(uid.clone()));
            line.extend(sample.clone());
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        fs::write(path.as_ref(), out)
            .with_context(|| format!("failed to write results to {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read results from {}", path.as_ref().display()))?;
        let mut uids = Vec::new();
        let mut samples = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut sample: Sample = serde_json::from_str(line)
                .with_context(|| format!("malformed results line {}", number + 1))?;
            let uid = match sample.shift_remove(UID_KEY) {
                Some(Value::String(uid)) => uid,
                Some(other) => other.to_string(),
                None => number.to_string(),
            };
            uids.push(uid);
            samples.push(sample);
        }
        Ok(Self { uids, samples })
    }
}

/// Per-sample metric outputs, grouped by module and metric. Every inner list
/// has one entry per dataset record, placeholders included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResults {
    pub samples: IndexMap<String, IndexMap<String, Vec<MetricResult>>>,
}

impl MetricsResults {
    /// Per-sample merge across each module's metrics, index-aligned.
    pub fn results(&self) -> IndexMap<String, Vec<MetricResult>> {
        self.samples
            .iter()
            .map(|(module, metrics)| {
                let total = metrics.values().map(Vec::len).max().unwrap_or(0);
                let merged = (0..total)
                    .map(|index| {
                        let mut row = MetricResult::new();
                        for per_sample in metrics.values() {
                            if let Some(result) = per_sample.get(index) {
                                row.extend(result.clone());
                            }
                        }
                        row
                    })
                    .collect();
                (module.clone(), merged)
            })
            .collect()
    }

    /// Folds each metric's per-sample list through that metric's own
    /// aggregator, looked up on the pipeline.
    pub fn aggregate(
        &self,
        pipeline: &Pipeline,
    ) -> Result<IndexMap<String, IndexMap<String, MetricResult>>, BindingError> {
        self.samples
            .iter()
            .map(|(module, metrics)| {
                let aggregated = metrics
                    .iter()
                    .map(|(name, per_sample)| {
                        let metric = pipeline.metric(module, name)?;
                        Ok((name.clone(), metric.metric.aggregate(per_sample)))
                    })
                    .collect::<Result<IndexMap<_, _>, BindingError>>()?;
                Ok((module.clone(), aggregated))
            })
            .collect()
    }

    /// Single JSON document, `{module → {metric → [per_sample_dicts]}}`.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(&self.samples)?)
            .with_context(|| format!("failed to write metrics to {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read metrics from {}", path.as_ref().display()))?;
        Ok(Self {
            samples: serde_json::from_str(&text)?,
        })
    }
}

/// Boolean gate outcomes, `{module → {test → bool}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub results: IndexMap<String, IndexMap<String, bool>>,
}

impl TestResults {
    pub fn all_passed(&self) -> bool {
        self.results
            .values()
            .all(|tests| tests.values().all(|&passed| passed))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(&self.results)?)
            .with_context(|| format!("failed to write tests to {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read tests from {}", path.as_ref().display()))?;
        Ok(Self {
            results: serde_json::from_str(&text)?,
        })
    }
}
