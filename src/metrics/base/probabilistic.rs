use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::{ConfigError, MetricError, TypeHint};
use crate::llm::{ParsedResponse, Provider, ProviderRegistry};
use crate::metrics::base::arg::{Arg, MetricField};
use crate::metrics::base::metric::{Metric, MetricArgs, MetricResult};
use crate::metrics::base::prompt::MetricPrompt;
use crate::metrics::base::response::{repair_json, ResponseFormat};

/// Category distribution extracted from the top-logprobs at the score-token
/// position.
#[derive(Debug, Clone)]
pub struct Score {
    pub probabilities: IndexMap<String, f64>,
    pub reasoning: String,
}

impl Score {
    /// Most likely category.
    pub fn score(&self) -> Option<&str> {
        self.probabilities
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(cat, _)| cat.as_str())
    }

    /// Probability mass of the most likely category.
    pub fn score_probability(&self) -> f64 {
        self.score()
            .and_then(|cat| self.probabilities.get(cat))
            .copied()
            .unwrap_or(0.0)
    }

    /// A distribution with all mass on one category, used when the score
    /// token cannot be located in the response.
    pub fn degenerate(categories: &[String], on: &str, reasoning: String) -> Self {
        let probabilities = categories
            .iter()
            .map(|cat| (cat.clone(), if cat == on { 1.0 } else { 0.0 }))
            .collect();
        Self {
            probabilities,
            reasoning,
        }
    }
}

/// A metric that derives a category probability distribution from the
/// model's top-logprobs at the position where it emitted the `score` field.
///
/// Each category in the response format must be a single token for the
/// distribution to be meaningful.
pub struct ProbabilisticMetric {
    name: String,
    pub prompt: MetricPrompt,
    pub temperature: f64,
    pub model: String,
    provider: Arc<dyn Provider>,
}

impl ProbabilisticMetric {
    pub fn new(
        name: impl Into<String>,
        prompt: MetricPrompt,
        temperature: f64,
        model: Option<&str>,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let model = match model {
            Some(m) => m.to_string(),
            None => registry.default_probabilistic_model()?,
        };
        let provider = registry.get(&model)?;
        Self::with_provider(name, prompt, temperature, model, provider)
    }

    pub fn with_provider(
        name: impl Into<String>,
        prompt: MetricPrompt,
        temperature: f64,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, ConfigError> {
        if prompt.args().is_empty() {
            return Err(ConfigError::Invalid(
                "user prompt must have at least one identifier".to_string(),
            ));
        }
        if temperature < 0.0 {
            return Err(ConfigError::Invalid(
                "temperature must be non-negative".to_string(),
            ));
        }
        if prompt.response_format.categories().is_none() {
            return Err(ConfigError::Invalid(
                "probabilistic metrics need a finite category set, not a JSON schema".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            prompt,
            temperature,
            model: model.into(),
            provider,
        })
    }

    fn process(&self, args: &MetricArgs) -> Result<Score, MetricError> {
        let categories = self
            .prompt
            .response_format
            .categories()
            .unwrap_or_default();
        let rendered = self.prompt.render(args)?;
        let response = self.provider.parse(
            &rendered,
            self.temperature,
            categories.len(),
            &self.prompt.response_format,
        )?;
        Ok(score_from_logprobs(
            &response,
            &categories,
            &self.prompt.response_format,
        ))
    }
}

impl Metric for ProbabilisticMetric {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let score = self.process(args)?;
        let top = score.score().unwrap_or_default().to_string();
        let typed_score = match &self.prompt.response_format {
            ResponseFormat::Integer { ge, .. } => {
                Value::from(top.parse::<i64>().unwrap_or(*ge))
            }
            _ => Value::String(top),
        };
        let mut result = IndexMap::from([
            (format!("{}_score", self.name), typed_score),
            (
                format!("{}_reasoning", self.name),
                Value::String(score.reasoning.clone()),
            ),
            (
                format!("{}_probabilities", self.name),
                serde_json::to_value(&score.probabilities)
                    .map_err(|e| MetricError::Runtime(e.to_string()))?,
            ),
        ]);
        if let Some(weighted) = self
            .prompt
            .response_format
            .weighted_score(&score.probabilities)
        {
            result.insert(format!("{}_weighted_score", self.name), Value::from(weighted));
        }
        Ok(result)
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        let mut schema = IndexMap::from([
            (
                format!("{}_score", self.name),
                MetricField::new(self.prompt.response_format.type_hint()),
            ),
            (
                format!("{}_reasoning", self.name),
                MetricField::new(TypeHint::Str),
            ),
            (
                format!("{}_probabilities", self.name),
                MetricField::new(TypeHint::dict_of(TypeHint::Str, TypeHint::Float)),
            ),
        ]);
        if matches!(self.prompt.response_format, ResponseFormat::Integer { .. }) {
            schema.insert(
                format!("{}_weighted_score", self.name),
                MetricField::new(TypeHint::Float).bounded(0.0, 1.0),
            );
        }
        schema
    }

    fn args(&self) -> IndexMap<String, Arg> {
        self.prompt.args().clone()
    }
}

/// Locates the score token in the structured response and converts its
/// top-logprobs into a normalized category distribution.
fn score_from_logprobs(
    response: &ParsedResponse,
    categories: &[String],
    format: &ResponseFormat,
) -> Score {
    let message = repair_json(&response.content).unwrap_or(Value::Null);
    let reasoning = message
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let score_token = message
        .get("score")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    let lower = format.lower_bound().unwrap_or_default();
    let token_index = response
        .logprobs
        .iter()
        .position(|tok| tok.token.trim() == score_token);
    let Some(token_index) = token_index else {
        return Score::degenerate(categories, &lower, reasoning);
    };

    let mut logp: IndexMap<String, f64> = categories
        .iter()
        .map(|cat| (cat.clone(), f64::NEG_INFINITY))
        .collect();
    for top in &response.logprobs[token_index].top_logprobs {
        let token = top.token.trim().to_lowercase();
        if let Some(entry) = logp.get_mut(&token) {
            *entry = entry.max(top.logprob);
        }
    }

    let probs: IndexMap<String, f64> = logp
        .into_iter()
        .map(|(cat, lp)| (cat, lp.exp()))
        .collect();
    let total: f64 = probs.values().sum();
    if total <= 0.0 {
        return Score::degenerate(categories, &lower, reasoning);
    }
    let probabilities = probs
        .into_iter()
        .map(|(cat, p)| (cat, p / total))
        .collect();
    Score {
        probabilities,
        reasoning,
    }
}
