use indexmap::IndexMap;
use rstest::*;
use serde_json::{json, Value};

use ragcheck::{
    mean_aggregate, Arg, BoundMetric, Columns, Dataset, EvalData, EvaluationRunner,
    MatchingStrategy, Metric, MetricArgs, MetricError, MetricField, MetricResult, Module,
    Pipeline, PrecisionRecallF1, RankedRetrievalMetrics, Record, TypeHint,
};

fn retrieval_dataset() -> Dataset {
    let records: Vec<Record> = vec![
        serde_json::from_value(json!({
            "retrieved_contexts": ["X", "Y"],
            "ground_truth_contexts": ["Z"],
        }))
        .unwrap(),
        serde_json::from_value(json!({
            "retrieved_contexts": ["A", "B"],
            "ground_truth_contexts": ["A"],
        }))
        .unwrap(),
    ];
    Dataset::from_records(records).unwrap()
}

fn retrieval_pipeline(metric: impl Metric + 'static) -> Pipeline {
    let dataset = retrieval_dataset();
    let module = Module::builder()
        .name("retriever")
        .output_type(TypeHint::list_of(TypeHint::Str))
        .metrics(vec![BoundMetric::new(metric)])
        .build();
    Pipeline::new(vec![module], dataset).unwrap()
}

#[rstest]
fn precision_recall_f1_over_exact_chunks() {
    let pipeline = retrieval_pipeline(PrecisionRecallF1::new(MatchingStrategy::ExactChunkMatch));
    let runner = EvaluationRunner::new(&pipeline);

    let results = runner.evaluate(EvalData::Dataset).unwrap();
    let samples = &results.samples["retriever"]["PrecisionRecallF1"];
    assert_eq!(samples.len(), 2);

    assert_eq!(samples[0]["precision"], json!(0.0));
    assert_eq!(samples[0]["recall"], json!(0.0));
    assert_eq!(samples[0]["f1"], json!(0.0));

    assert_eq!(samples[1]["precision"], json!(0.5));
    assert_eq!(samples[1]["recall"], json!(1.0));
    assert!((samples[1]["f1"].as_f64().unwrap() - 2.0 / 3.0).abs() < 1e-9);

    let aggregated = results.aggregate(&pipeline).unwrap();
    let precision = aggregated["retriever"]["PrecisionRecallF1"]["precision"]
        .as_f64()
        .unwrap();
    assert!((precision - 0.25).abs() < 1e-9);
}

#[rstest]
fn ranked_metrics_reward_an_early_hit() {
    let metric = RankedRetrievalMetrics::new(MatchingStrategy::ExactChunkMatch).unwrap();
    let pipeline = retrieval_pipeline(metric);
    let runner = EvaluationRunner::new(&pipeline);

    let results = runner.evaluate(EvalData::Dataset).unwrap();
    let samples = &results.samples["retriever"]["RankedRetrievalMetrics"];

    assert_eq!(samples[0]["average_precision"], json!(0.0));
    assert_eq!(samples[0]["reciprocal_rank"], json!(0.0));
    assert_eq!(samples[0]["ndcg"], json!(0.0));

    assert_eq!(samples[1]["average_precision"], json!(1.0));
    assert_eq!(samples[1]["reciprocal_rank"], json!(1.0));
    assert_eq!(samples[1]["ndcg"], json!(1.0));
}

#[rstest]
fn sentence_level_strategies_cannot_rank() {
    assert!(RankedRetrievalMetrics::new(MatchingStrategy::ExactSentenceMatch).is_err());
}

/// Doubles a numeric input; deterministic, so batch output must equal
/// per-sample calls in input order.
struct Doubler;

impl Metric for Doubler {
    fn name(&self) -> String {
        "Doubler".to_string()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let value = args
            .get("value")
            .and_then(Value::as_f64)
            .ok_or(MetricError::MissingArg {
                name: "value".to_string(),
            })?;
        Ok(IndexMap::from([(
            "doubled".to_string(),
            Value::from(value * 2.0),
        )]))
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        IndexMap::from([(
            "doubled".to_string(),
            MetricField::new(TypeHint::Float),
        )])
    }

    fn args(&self) -> IndexMap<String, Arg> {
        IndexMap::from([("value".to_string(), Arg::new(TypeHint::Float))])
    }
}

#[rstest]
fn batch_preserves_input_order() {
    let metric = Doubler;
    let values: Vec<Value> = (0..50).map(|v| Value::from(v as f64)).collect();
    let columns: Columns = IndexMap::from([("value".to_string(), values)]);

    let results = metric.batch(&columns);
    assert_eq!(results.len(), 50);
    for (idx, result) in results.iter().enumerate() {
        assert_eq!(result["doubled"], Value::from(idx as f64 * 2.0));
    }
}

#[rstest]
fn default_aggregation_is_the_field_mean() {
    let metric = Doubler;
    let values: Vec<Value> = vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)];
    let columns: Columns = IndexMap::from([("value".to_string(), values)]);

    let results = metric.batch(&columns);
    let aggregated = metric.aggregate(&results);
    assert_eq!(aggregated, mean_aggregate(&results));
    assert_eq!(aggregated["doubled"], Value::from(4.0));
}

/// Fails on every third sample to exercise the containment path.
struct Flaky;

impl Metric for Flaky {
    fn name(&self) -> String {
        "Flaky".to_string()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let index = args
            .get("index")
            .and_then(Value::as_u64)
            .ok_or(MetricError::MissingArg {
                name: "index".to_string(),
            })?;
        if index % 3 == 0 {
            return Err(MetricError::Runtime("synthetic failure".to_string()));
        }
        Ok(IndexMap::from([(
            "score".to_string(),
            Value::from(index as f64),
        )]))
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        IndexMap::from([("score".to_string(), MetricField::new(TypeHint::Float))])
    }

    fn args(&self) -> IndexMap<String, Arg> {
        IndexMap::from([("index".to_string(), Arg::new(TypeHint::Int))])
    }
}

#[rstest]
fn failing_samples_degrade_to_placeholders() {
    let metric = Flaky;
    let indices: Vec<Value> = (0..9u64).map(Value::from).collect();
    let columns: Columns = IndexMap::from([("index".to_string(), indices)]);

    let results = metric.batch(&columns);
    assert_eq!(results.len(), 9);
    for (idx, result) in results.iter().enumerate() {
        if idx % 3 == 0 {
            assert_eq!(result["score"], Value::Null);
        } else {
            assert_eq!(result["score"], Value::from(idx as f64));
        }
    }
}
