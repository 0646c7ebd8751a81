use std::fs;

use indexmap::IndexMap;
use rstest::*;
use serde_json::{json, Value};
use tempfile::tempdir;

use ragcheck::{
    repair_json, Arg, Dataset, MetricPrompt, Record, ResponseFormat, ScoreError, TypeHint,
};

#[rstest]
#[case("The score is 4 out of 5", 4)]
#[case("nothing", 1)]
#[case("I'd say 9, definitely", 5)]
#[case("0", 1)]
fn bounded_int_extracts_and_clamps(#[case] response: &str, #[case] expected: i64) {
    let format = ResponseFormat::integer(1, 5);
    assert_eq!(format.score(response).unwrap(), json!(expected));
}

#[rstest]
fn category_scoring_takes_the_first_occurrence() {
    let format = ResponseFormat::YesOrNo;
    assert_eq!(
        format.score("Well, no. Although yes in spirit.").unwrap(),
        json!("no")
    );
    assert_eq!(format.score("  YES  ").unwrap(), json!("yes"));
    assert!(matches!(
        format.score("unsure").unwrap_err(),
        ScoreError::NoCategory
    ));
}

#[rstest]
fn category_matching_respects_word_boundaries() {
    let format = ResponseFormat::GoodOrBad;
    // "goodness" must not match "good".
    assert!(format.score("goodness gracious").is_err());
    assert_eq!(format.score("that was good!").unwrap(), json!("good"));
}

#[rstest]
fn json_scoring_repairs_and_conforms() {
    let schema = IndexMap::from([
        ("relevant".to_string(), TypeHint::Bool),
        ("reason".to_string(), TypeHint::Str),
    ]);
    let format = ResponseFormat::json(schema);

    let response = "```json\n{\"relevant\": true, \"reason\": \"on topic\",}\n```";
    assert_eq!(
        format.score(response).unwrap(),
        json!({"relevant": true, "reason": "on topic"})
    );

    // Missing keys conform to null instead of failing.
    assert_eq!(
        format.score("{\"relevant\": false}").unwrap(),
        json!({"relevant": false, "reason": null})
    );
}

#[rstest]
fn repair_slices_to_the_embedded_object() {
    let parsed = repair_json("Sure! Here you go: {\"score\": 3} Hope that helps.").unwrap();
    assert_eq!(parsed, json!({"score": 3}));
    assert!(repair_json("no json here at all").is_err());
}

#[rstest]
fn scoring_is_stable_under_whitespace() {
    let format = ResponseFormat::integer(1, 5);
    assert_eq!(
        format.score("  3  ").unwrap(),
        format.score("3").unwrap()
    );
}

#[rstest]
fn metric_prompt_round_trips_through_its_dict_form() {
    let args = IndexMap::from([
        (
            "question".to_string(),
            Arg::new(TypeHint::Str).described("The user question"),
        ),
        (
            "answer".to_string(),
            Arg::new(TypeHint::list_of(TypeHint::Str)),
        ),
    ]);
    let prompt = MetricPrompt::new(
        "You are a strict grader.",
        "Question: {{ question }}\nAnswer: {{ answer }}",
        ResponseFormat::integer(1, 5),
        Some(args),
    )
    .unwrap()
    .described("Grades answers for correctness");

    let serialized = prompt.serialize();
    let restored = MetricPrompt::deserialize(&serialized).unwrap();

    assert_eq!(
        restored.template.system_template(),
        prompt.template.system_template()
    );
    assert_eq!(
        restored.template.user_template(),
        prompt.template.user_template()
    );
    assert_eq!(restored.args(), prompt.args());
    assert_eq!(restored.response_format, prompt.response_format);
    assert_eq!(restored.description, prompt.description);
}

#[rstest]
fn prompt_arguments_must_cover_template_variables() {
    let err = MetricPrompt::new(
        "sys",
        "Question: {{ question }}",
        ResponseFormat::YesOrNo,
        Some(IndexMap::new()),
    )
    .unwrap_err();
    assert!(err.to_string().contains("question"));
}

#[rstest]
fn dataset_round_trips_bitwise() {
    let records: Vec<Record> = vec![
        serde_json::from_value(json!({"uid": "a", "question": "q1", "grade": 4})).unwrap(),
        serde_json::from_value(json!({"uid": "b", "question": "q2", "grade": 2})).unwrap(),
    ];
    let dataset = Dataset::from_records(records).unwrap();

    let dir = tempdir().unwrap();
    dataset.save(dir.path()).unwrap();
    let reloaded = Dataset::load(dir.path()).unwrap();

    assert_eq!(reloaded.manifest(), dataset.manifest());
    assert_eq!(reloaded.records(), dataset.records());

    // Saving the reloaded dataset reproduces the files byte for byte.
    let second = tempdir().unwrap();
    reloaded.save(second.path()).unwrap();
    for file in ["manifest.yaml", "dataset.jsonl"] {
        assert_eq!(
            fs::read(dir.path().join(file)).unwrap(),
            fs::read(second.path().join(file)).unwrap(),
        );
    }
}

#[rstest]
fn type_conflicts_fail_dataset_loading() {
    let records: Vec<Record> = vec![
        serde_json::from_value(json!({"grade": 4})).unwrap(),
        serde_json::from_value(json!({"grade": "four"})).unwrap(),
    ];
    assert!(Dataset::from_records(records).is_err());
}

#[rstest]
fn rendered_prompts_substitute_arguments() {
    let prompt = MetricPrompt::new(
        "You are a strict grader.",
        "Question: {{ question }}",
        ResponseFormat::YesOrNo,
        None,
    )
    .unwrap();
    let kwargs = IndexMap::from([("question".to_string(), Value::from("Why?"))]);
    let rendered = prompt.render(&kwargs).unwrap();
    assert_eq!(rendered.user_prompt, "Question: Why?");
}
