use indexmap::IndexMap;
use serde_json::Value;

use crate::core::{MetricError, TypeHint};
use crate::metrics::base::{Arg, Metric, MetricArgs, MetricField, MetricResult};
use crate::metrics::retrieval::matching::{split_sentences, MatchingLevel, MatchingStrategy};

/// Rank-agnostic retrieval quality: precision, recall and F1 of retrieved
/// contexts against ground truth contexts under a matching strategy.
pub struct PrecisionRecallF1 {
    strategy: MatchingStrategy,
}

impl PrecisionRecallF1 {
    pub fn new(strategy: MatchingStrategy) -> Self {
        Self { strategy }
    }
}

impl Default for PrecisionRecallF1 {
    fn default() -> Self {
        Self::new(MatchingStrategy::ExactChunkMatch)
    }
}

impl Metric for PrecisionRecallF1 {
    fn name(&self) -> String {
        "PrecisionRecallF1".to_string()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let retrieved = string_list(args, "retrieved_contexts")?;
        let ground_truth = string_list(args, "ground_truth_contexts")?;

        let (retrieved, ground_truth) = match self.strategy.level() {
            MatchingLevel::Chunk => (retrieved, ground_truth),
            MatchingLevel::Sentence => (
                retrieved.iter().flat_map(|c| split_sentences(c)).collect(),
                ground_truth
                    .iter()
                    .flat_map(|c| split_sentences(c))
                    .collect(),
            ),
        };

        // Duplicate ground truth entries count once.
        let ground_truth: Vec<&String> = {
            let mut seen = std::collections::HashSet::new();
            ground_truth.iter().filter(|gt| seen.insert(*gt)).collect()
        };

        let mut matched_retrieved = 0usize;
        let mut hit_truths = std::collections::HashSet::new();
        for chunk in &retrieved {
            let mut matched = false;
            for gt in &ground_truth {
                if self.strategy.is_relevant(chunk, gt) {
                    matched = true;
                    hit_truths.insert(*gt);
                }
            }
            matched_retrieved += matched as usize;
        }

        let precision = if retrieved.is_empty() {
            0.0
        } else {
            matched_retrieved as f64 / retrieved.len() as f64
        };
        let recall = if ground_truth.is_empty() {
            0.0
        } else {
            hit_truths.len() as f64 / ground_truth.len() as f64
        };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(IndexMap::from([
            ("precision".to_string(), Value::from(precision)),
            ("recall".to_string(), Value::from(recall)),
            ("f1".to_string(), Value::from(f1)),
        ]))
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        ["precision", "recall", "f1"]
            .into_iter()
            .map(|name| {
                (
                    name.to_string(),
                    MetricField::new(TypeHint::Float).bounded(0.0, 1.0),
                )
            })
            .collect()
    }

    fn args(&self) -> IndexMap<String, Arg> {
        retrieval_args()
    }

    fn is_cpu_bound(&self) -> bool {
        true
    }
}

pub(crate) fn retrieval_args() -> IndexMap<String, Arg> {
    IndexMap::from([
        (
            "retrieved_contexts".to_string(),
            Arg::new(TypeHint::list_of(TypeHint::Str)).described("Retrieved contexts"),
        ),
        (
            "ground_truth_contexts".to_string(),
            Arg::new(TypeHint::list_of(TypeHint::Str))
                .described("Ground truth contexts")
                .ground_truth(),
        ),
    ])
}

pub(crate) fn string_list(args: &MetricArgs, name: &str) -> Result<Vec<String>, MetricError> {
    let value = args.get(name).ok_or_else(|| MetricError::MissingArg {
        name: name.to_string(),
    })?;
    let items = value.as_array().ok_or_else(|| {
        MetricError::Runtime(format!("argument `{name}` must be a list of strings"))
    })?;
    items
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                MetricError::Runtime(format!("argument `{name}` must be a list of strings"))
            })
        })
        .collect()
}
