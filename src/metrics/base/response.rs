use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::core::{ScoreError, TypeHint};

/// Declared shape of an LLM judge's response and the scorer that turns raw
/// model text into a typed value.
///
/// Category formats match the first category token occurring in the
/// response. `Integer` extracts and clamps the first numeric token.
/// `Json` repair-parses the response and coerces it to the declared schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "class")]
pub enum ResponseFormat {
    GoodOrBad,
    TrueOrFalse,
    YesOrNo,
    Category {
        categories: Vec<String>,
    },
    Integer {
        ge: i64,
        le: i64,
    },
    Json {
        schema: IndexMap<String, TypeHint>,
        #[serde(default)]
        is_list: bool,
    },
}

impl ResponseFormat {
    pub fn integer(ge: i64, le: i64) -> Self {
        debug_assert!(ge < le, "ge must be less than le");
        ResponseFormat::Integer { ge, le }
    }

    pub fn json(schema: IndexMap<String, TypeHint>) -> Self {
        ResponseFormat::Json {
            schema,
            is_list: false,
        }
    }

    pub fn json_list(schema: IndexMap<String, TypeHint>) -> Self {
        ResponseFormat::Json {
            schema,
            is_list: true,
        }
    }

    /// The closed category set, lowercase, in declaration order. `None` for
    /// JSON formats, which have no finite category space.
    pub fn categories(&self) -> Option<Vec<String>> {
        match self {
            ResponseFormat::GoodOrBad => Some(vec!["good".into(), "bad".into()]),
            ResponseFormat::TrueOrFalse => Some(vec!["true".into(), "false".into()]),
            ResponseFormat::YesOrNo => Some(vec!["yes".into(), "no".into()]),
            ResponseFormat::Category { categories } => {
                Some(categories.iter().map(|c| c.to_lowercase()).collect())
            }
            ResponseFormat::Integer { ge, le } => {
                Some((*ge..=*le).map(|v| v.to_string()).collect())
            }
            ResponseFormat::Json { .. } => None,
        }
    }

    /// The scorer's deterministic fallback: the first category, or the lower
    /// bound for integers. Used when a probabilistic response degenerates.
    pub fn lower_bound(&self) -> Option<String> {
        match self {
            ResponseFormat::Integer { ge, .. } => Some(ge.to_string()),
            other => other.categories().and_then(|c| c.into_iter().next()),
        }
    }

    pub fn type_hint(&self) -> TypeHint {
        match self {
            ResponseFormat::Integer { .. } => TypeHint::Int,
            ResponseFormat::Json { .. } => TypeHint::dict_of(TypeHint::Str, TypeHint::Any),
            _ => TypeHint::Str,
        }
    }

    /// Parses raw model text into a typed score value.
    ///
    /// Categories fail with [`ScoreError::NoCategory`] when no token
    /// matches; integers fall back to `ge`; JSON falls back to `null` for
    /// each unparseable declared key.
    pub fn score(&self, input: &str) -> Result<Value, ScoreError> {
        match self {
            ResponseFormat::Integer { ge, le } => Ok(Value::from(score_integer(input, *ge, *le))),
            ResponseFormat::Json { schema, is_list } => score_json(input, schema, *is_list),
            categorical => {
                let categories = categorical
                    .categories()
                    .expect("categorical formats always declare categories");
                score_category(input, &categories).map(Value::String)
            }
        }
    }

    /// Expected value of a bounded-integer distribution, rescaled to
    /// `[0, 1]`. `None` for non-integer formats.
    pub fn weighted_score(&self, probabilities: &IndexMap<String, f64>) -> Option<f64> {
        let ResponseFormat::Integer { ge, le } = self else {
            return None;
        };
        let total: f64 = probabilities
            .iter()
            .filter_map(|(cat, prob)| {
                cat.parse::<i64>()
                    .ok()
                    .map(|c| (c - ge) as f64 * prob)
            })
            .sum();
        Some(total / (le - ge) as f64)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ResponseFormat::Json { .. })
    }
}

/// First-occurring category token, word-boundary matched on the lowercased
/// response.
fn score_category(input: &str, categories: &[String]) -> Result<String, ScoreError> {
    let lowered = input.to_lowercase();
    let words: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();
    categories
        .iter()
        .filter_map(|cat| {
            words
                .iter()
                .position(|w| *w == cat.as_str())
                .map(|idx| (idx, cat.clone()))
        })
        .min_by_key(|(idx, _)| *idx)
        .map(|(_, cat)| cat)
        .ok_or(ScoreError::NoCategory)
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static pattern compiles"))
}

/// First numeric token clamped to `[ge, le]`; `ge` when no number is found.
fn score_integer(input: &str, ge: i64, le: i64) -> i64 {
    number_pattern()
        .find(input)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|num| num.clamp(ge as f64, le as f64) as i64)
        .unwrap_or(ge)
}

fn score_json(
    input: &str,
    schema: &IndexMap<String, TypeHint>,
    is_list: bool,
) -> Result<Value, ScoreError> {
    let parsed = repair_json(input)?;
    if is_list {
        let items = match parsed {
            Value::Array(items) => items,
            single => vec![single],
        };
        Ok(Value::Array(
            items.iter().map(|item| conform(item, schema)).collect(),
        ))
    } else {
        Ok(conform(&parsed, schema))
    }
}

/// Coerces each declared key to its declared type, `null` when absent or
/// incoercible.
fn conform(value: &Value, schema: &IndexMap<String, TypeHint>) -> Value {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    let mut out = Map::new();
    for (key, hint) in schema {
        let coerced = obj.get(key).map(|v| hint.coerce(v)).unwrap_or(Value::Null);
        out.insert(key.clone(), coerced);
    }
    Value::Object(out)
}

/// Tolerant JSON parse: strips markdown code fences, slices to the outermost
/// object or array, and drops trailing commas before handing the text to
/// serde.
pub fn repair_json(input: &str) -> Result<Value, ScoreError> {
    let mut text = input.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let text = text.trim();

    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    let start = text.find(['{', '[']);
    let end = text.rfind(['}', ']']);
    let sliced = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => text,
    };
    if let Ok(value) = serde_json::from_str(sliced) {
        return Ok(value);
    }

    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let pattern = TRAILING_COMMA
        .get_or_init(|| Regex::new(r",\s*([}\]])").expect("static pattern compiles"));
    let repaired = pattern.replace_all(sliced, "$1");
    serde_json::from_str(&repaired).map_err(|_| ScoreError::UnparseableJson)
}
