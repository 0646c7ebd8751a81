use std::sync::Arc;

use indexmap::IndexMap;
use rstest::*;
use serde_json::{json, Value};
use tempfile::tempdir;

use ragcheck::{
    prepare, Arg, BoundMetric, Dataset, EvalData, EvaluationRunner, GreaterOrEqualThan,
    InputSource, LogMode, MeanGreaterOrEqualThan, Metric, MetricArgs, MetricError, MetricField,
    MetricResult, MetricsResults, Module, ParamPlan, Pipeline, PipelineLogger, PipelineResults,
    Placeholder, Record, ToolCall, TypeHint,
};

fn qa_dataset() -> Dataset {
    let records: Vec<Record> = vec![
        serde_json::from_value(json!({
            "uid": "q1",
            "question": "What is the capital of France?",
            "ground_truths": ["Paris"],
        }))
        .unwrap(),
        serde_json::from_value(json!({
            "uid": "q2",
            "question": "Who wrote Dune?",
            "ground_truths": ["Frank Herbert"],
        }))
        .unwrap(),
    ];
    Dataset::from_records(records).unwrap()
}

/// Counts how many ground truths the answer mentions; enough structure to
/// exercise plan-driven binding end to end.
struct AnswerOverlap;

impl Metric for AnswerOverlap {
    fn name(&self) -> String {
        "AnswerOverlap".to_string()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let answer = args
            .get("answer")
            .and_then(Value::as_str)
            .ok_or(MetricError::MissingArg {
                name: "answer".to_string(),
            })?;
        let truths = args
            .get("ground_truths")
            .and_then(Value::as_array)
            .ok_or(MetricError::MissingArg {
                name: "ground_truths".to_string(),
            })?;
        let hits = truths
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| answer.contains(t))
            .count();
        Ok(IndexMap::from([(
            "overlap".to_string(),
            Value::from(hits as f64 / truths.len().max(1) as f64),
        )]))
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        IndexMap::from([(
            "overlap".to_string(),
            MetricField::new(TypeHint::Float).bounded(0.0, 1.0),
        )])
    }

    fn args(&self) -> IndexMap<String, Arg> {
        IndexMap::from([
            ("question".to_string(), Arg::new(TypeHint::Str)),
            ("answer".to_string(), Arg::new(TypeHint::Str)),
            (
                "ground_truths".to_string(),
                Arg::new(TypeHint::list_of(TypeHint::Str)).ground_truth(),
            ),
        ])
    }
}

fn llm_plan() -> ParamPlan {
    IndexMap::from([
        (
            "question".to_string(),
            Placeholder::dataset_field("question"),
        ),
        ("answer".to_string(), Placeholder::module_output()),
        (
            "ground_truths".to_string(),
            Placeholder::dataset_field("ground_truths"),
        ),
    ])
}

fn staged_pipeline(dataset: Dataset) -> Pipeline {
    let retriever = Module::builder()
        .name("retriever")
        .inputs(vec![dataset.field("question").unwrap().into()])
        .output_type(TypeHint::list_of(TypeHint::Str))
        .build();
    let reranker = Module::builder()
        .name("reranker")
        .inputs(vec![InputSource::module("retriever")])
        .output_type(TypeHint::list_of(TypeHint::Str))
        .build();
    let llm = Module::builder()
        .name("llm")
        .inputs(vec![InputSource::module("reranker")])
        .output_type(TypeHint::Str)
        .metrics(vec![BoundMetric::new(AnswerOverlap).use_params(llm_plan())])
        .tests(vec![
            Arc::new(MeanGreaterOrEqualThan::new("Overlap", "overlap", 0.8)),
            Arc::new(GreaterOrEqualThan::new("OverlapAll", "overlap", 0.8)),
        ])
        .build();
    Pipeline::new(vec![retriever, reranker, llm], dataset).unwrap()
}

fn logged_results(pipeline: &Pipeline) -> PipelineResults {
    let mut logger = PipelineLogger::new(pipeline);
    logger
        .log("q1", "retriever", json!(["Paris is the capital of France."]), LogMode::Replace)
        .unwrap();
    logger
        .log("q1", "reranker", json!(["Paris is the capital of France."]), LogMode::Replace)
        .unwrap();
    logger
        .log("q1", "llm", json!("The capital is Paris."), LogMode::Replace)
        .unwrap();
    logger
        .log("q2", "retriever", json!(["Dune is a novel."]), LogMode::Replace)
        .unwrap();
    logger
        .log("q2", "reranker", json!(["Dune is a novel."]), LogMode::Replace)
        .unwrap();
    logger
        .log("q2", "llm", json!("No idea."), LogMode::Replace)
        .unwrap();
    logger.results(pipeline).unwrap()
}

#[rstest]
fn plans_bind_columns_aligned_with_the_dataset() {
    let dataset = qa_dataset();
    let pipeline = staged_pipeline(dataset);
    let results = logged_results(&pipeline);

    let llm = pipeline.module("llm").unwrap();
    let metric = pipeline.metric("llm", "AnswerOverlap").unwrap();
    let columns = prepare(pipeline.dataset(), &results, llm, metric).unwrap();

    assert_eq!(columns["question"].len(), 2);
    assert_eq!(columns["answer"].len(), 2);
    assert_eq!(columns["ground_truths"].len(), 2);
    assert_eq!(columns["answer"][0], json!("The capital is Paris."));
    assert_eq!(columns["ground_truths"][1], json!(["Frank Herbert"]));
}

#[rstest]
fn evaluate_and_test_gate_through_the_runner() {
    let dataset = qa_dataset();
    let pipeline = staged_pipeline(dataset);
    let results = logged_results(&pipeline);

    let runner = EvaluationRunner::new(&pipeline);
    let metrics = runner.evaluate(EvalData::Results(results)).unwrap();

    let samples = &metrics.samples["llm"]["AnswerOverlap"];
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0]["overlap"], json!(1.0));
    assert_eq!(samples[1]["overlap"], json!(0.0));

    let tests = runner.test(&metrics);
    // Mean is 0.5: both gates fail at 0.8.
    assert!(!tests.results["llm"]["Overlap"]);
    assert!(!tests.results["llm"]["OverlapAll"]);
    assert!(!tests.all_passed());

    let annotated = pipeline.test_graph(&tests);
    assert!(annotated.contains("Overlap FAIL"));
}

#[rstest]
fn missing_plan_reference_aborts_before_metrics_run() {
    let dataset = qa_dataset();
    let plan: ParamPlan = IndexMap::from([
        ("question".to_string(), Placeholder::dataset_field("missing")),
        ("answer".to_string(), Placeholder::module_output()),
        (
            "ground_truths".to_string(),
            Placeholder::dataset_field("ground_truths"),
        ),
    ]);
    let llm = Module::builder()
        .name("llm")
        .output_type(TypeHint::Str)
        .metrics(vec![BoundMetric::new(AnswerOverlap).use_params(plan)])
        .build();
    let pipeline = Pipeline::new(vec![llm], dataset).unwrap();

    let runner = EvaluationRunner::new(&pipeline);
    assert!(runner.evaluate(EvalData::Default).is_err());
}

#[rstest]
fn append_mode_extends_list_slots() {
    let dataset = qa_dataset();
    let pipeline = staged_pipeline(dataset);
    let mut logger = PipelineLogger::new(&pipeline);

    logger
        .log("q1", "retriever", json!(["chunk-1"]), LogMode::Append)
        .unwrap();
    logger
        .log("q1", "retriever", json!(["chunk-2", "chunk-3"]), LogMode::Append)
        .unwrap();
    logger
        .log("q1", "retriever", json!("chunk-4"), LogMode::Append)
        .unwrap();
    assert_eq!(
        logger.samples()["q1"]["retriever"],
        json!(["chunk-1", "chunk-2", "chunk-3", "chunk-4"])
    );

    logger
        .log("q1", "retriever", json!(["fresh"]), LogMode::Replace)
        .unwrap();
    assert_eq!(logger.samples()["q1"]["retriever"], json!(["fresh"]));

    assert!(logger
        .log("q1", "no_such_module", json!("x"), LogMode::Replace)
        .is_err());
}

#[rstest]
fn tool_calls_land_on_the_trace_slot() {
    let dataset = qa_dataset();
    let searcher = Module::builder()
        .name("searcher")
        .output_type(TypeHint::Str)
        .agent(
            ragcheck::AgentSpec::builder()
                .tools(vec![ragcheck::Tool::builder()
                    .name("search")
                    .out_type(TypeHint::list_of(TypeHint::Str))
                    .build()])
                .build(),
        )
        .build();
    let pipeline = Pipeline::new(vec![searcher], dataset).unwrap();

    let mut logger = PipelineLogger::new(&pipeline);
    logger
        .log_tool_call("q1", "searcher", ToolCall::new("search").arg("query", "dune"))
        .unwrap();
    let trace = &logger.samples()["q1"]["_tool__searcher"];
    assert_eq!(trace, &json!([{"name": "search", "kwargs": {"query": "dune"}}]));
}

#[rstest]
fn lambda_placeholders_fall_back_to_the_dataset_record() {
    let dataset = qa_dataset();
    let plan: ParamPlan = IndexMap::from([(
        "question".to_string(),
        Placeholder::lambda(|sample| sample.get("question").cloned()),
    )]);
    let module = Module::builder()
        .name("llm")
        .output_type(TypeHint::Str)
        .metrics(vec![BoundMetric::new(AnswerOverlap).use_params(plan)])
        .build();
    let pipeline = Pipeline::new(vec![module], dataset).unwrap();

    // Empty results carry no `question` slot, so the lambda is re-applied to
    // the dataset records.
    let results = PipelineResults::from_pipeline(&pipeline);
    let llm = pipeline.module("llm").unwrap();
    let metric = pipeline.metric("llm", "AnswerOverlap").unwrap();
    let columns = prepare(pipeline.dataset(), &results, llm, metric).unwrap();
    assert_eq!(columns["question"][1], json!("Who wrote Dune?"));
}

#[rstest]
fn results_round_trip_through_disk() {
    let dataset = qa_dataset();
    let pipeline = staged_pipeline(dataset);
    let results = logged_results(&pipeline);

    let dir = tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    results.save(&path).unwrap();
    let reloaded = PipelineResults::load(&path).unwrap();
    assert_eq!(reloaded, results);

    let runner = EvaluationRunner::new(&pipeline);
    let metrics = runner.evaluate(EvalData::Results(results)).unwrap();
    let metrics_path = dir.path().join("metrics.json");
    metrics.save(&metrics_path).unwrap();
    let metrics_reloaded = MetricsResults::load(&metrics_path).unwrap();
    assert_eq!(metrics_reloaded, metrics);

    let tests = runner.test(&metrics);
    let tests_path = dir.path().join("tests.json");
    tests.save(&tests_path).unwrap();
    assert_eq!(ragcheck::TestResults::load(&tests_path).unwrap(), tests);
}

#[rstest]
fn logs_with_unknown_uids_are_rejected() {
    let dataset = qa_dataset();
    let pipeline = staged_pipeline(dataset);

    let mut logger = PipelineLogger::new(&pipeline);
    logger
        .log("stranger", "llm", json!("hello"), LogMode::Replace)
        .unwrap();
    assert!(logger.results(&pipeline).is_err());
}
