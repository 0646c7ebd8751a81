use indexmap::IndexMap;
use serde_json::Value;

use crate::core::{MetricError, TypeHint};
use crate::metrics::base::{Arg, Metric, MetricArgs, MetricField, MetricResult};
use crate::metrics::retrieval::matching::{MatchingLevel, MatchingStrategy};
use crate::metrics::retrieval::precision_recall::{retrieval_args, string_list};

/// Rank-aware retrieval quality: mean average precision, reciprocal rank and
/// NDCG of a single query retrieval. Calculated at chunk level.
pub struct RankedRetrievalMetrics {
    strategy: MatchingStrategy,
}

impl RankedRetrievalMetrics {
    pub fn new(strategy: MatchingStrategy) -> Result<Self, MetricError> {
        if strategy.level() != MatchingLevel::Chunk {
            return Err(MetricError::Runtime(
                "ranked metrics are calculated at chunk level".to_string(),
            ));
        }
        Ok(Self { strategy })
    }

    fn is_hit(&self, chunk: &str, ground_truth: &[String]) -> bool {
        ground_truth.iter().any(|gt| self.strategy.is_relevant(chunk, gt))
    }

    fn average_precision(&self, retrieved: &[String], ground_truth: &[String]) -> f64 {
        let mut hits = 0usize;
        let mut total = 0.0;
        for (rank, chunk) in retrieved.iter().enumerate() {
            if self.is_hit(chunk, ground_truth) {
                hits += 1;
                total += hits as f64 / (rank + 1) as f64;
            }
        }
        if hits == 0 {
            0.0
        } else {
            total / hits as f64
        }
    }

    fn reciprocal_rank(&self, retrieved: &[String], ground_truth: &[String]) -> f64 {
        retrieved
            .iter()
            .position(|chunk| self.is_hit(chunk, ground_truth))
            .map(|rank| 1.0 / (rank + 1) as f64)
            .unwrap_or(0.0)
    }

    // Each ground truth chunk contributes gain once, at the rank of the
    // first retrieved chunk matching it.
    fn ndcg(&self, retrieved: &[String], ground_truth: &[String]) -> f64 {
        let mut matched: Vec<&String> = Vec::new();
        let mut dcg = 0.0;
        for (rank, chunk) in retrieved.iter().enumerate() {
            let hit = ground_truth
                .iter()
                .find(|gt| !matched.contains(gt) && self.strategy.is_relevant(chunk, gt));
            if let Some(gt) = hit {
                dcg += 1.0 / ((rank + 2) as f64).log2();
                matched.push(gt);
            }
        }
        let idcg: f64 = (0..ground_truth.len())
            .map(|rank| 1.0 / ((rank + 2) as f64).log2())
            .sum();
        if idcg == 0.0 {
            0.0
        } else {
            dcg / idcg
        }
    }
}

impl Default for RankedRetrievalMetrics {
    fn default() -> Self {
        Self {
            strategy: MatchingStrategy::ExactChunkMatch,
        }
    }
}

impl Metric for RankedRetrievalMetrics {
    fn name(&self) -> String {
        "RankedRetrievalMetrics".to_string()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let retrieved = string_list(args, "retrieved_contexts")?;
        let ground_truth = string_list(args, "ground_truth_contexts")?;
        Ok(IndexMap::from([
            (
                "average_precision".to_string(),
                Value::from(self.average_precision(&retrieved, &ground_truth)),
            ),
            (
                "reciprocal_rank".to_string(),
                Value::from(self.reciprocal_rank(&retrieved, &ground_truth)),
            ),
            (
                "ndcg".to_string(),
                Value::from(self.ndcg(&retrieved, &ground_truth)),
            ),
        ]))
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        ["average_precision", "reciprocal_rank", "ndcg"]
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
