use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::{ConfigError, MetricError, TypeHint};
use crate::llm::{Provider, ProviderRegistry};
use crate::metrics::base::arg::{Arg, MetricField};
use crate::metrics::base::metric::{Metric, MetricArgs, MetricResult};
use crate::metrics::base::prompt::MetricPrompt;
use crate::metrics::base::response::ResponseFormat;

/// An LLM-judged metric: renders its prompt, asks the provider, scores the
/// raw response with the prompt's response format.
///
/// JSON formats spread the conformed object into the result fields; scalar
/// formats emit `<name>_score`.
pub struct LLMMetric {
    name: String,
    pub prompt: MetricPrompt,
    pub temperature: f64,
    pub model: String,
    provider: Arc<dyn Provider>,
}

impl LLMMetric {
    pub fn new(
        name: impl Into<String>,
        prompt: MetricPrompt,
        temperature: f64,
        model: Option<&str>,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        if temperature < 0.0 {
            return Err(ConfigError::Invalid(
                "temperature must be non-negative".to_string(),
            ));
        }
        let (model, provider) = registry.resolve(model)?;
        Ok(Self {
            name: name.into(),
            prompt,
            temperature,
            model,
            provider,
        })
    }

    /// Builds a metric around an already-constructed provider, bypassing the
    /// registry. Used by adapters and tests.
    pub fn with_provider(
        name: impl Into<String>,
        prompt: MetricPrompt,
        temperature: f64,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            name: name.into(),
            prompt,
            temperature,
            model: model.into(),
            provider,
        }
    }

    pub fn help(&self) -> String {
        self.prompt
            .description
            .clone()
            .unwrap_or_else(|| "No description available".to_string())
    }
}

impl Metric for LLMMetric {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        let rendered = self.prompt.render(args)?;
        let response = self.provider.run(&rendered, self.temperature)?;
        let score = self.prompt.response_format.score(&response)?;
        Ok(score_to_result(
            &self.name,
            &self.prompt.response_format,
            score,
        ))
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        match &self.prompt.response_format {
            ResponseFormat::Json { schema, .. } => schema
                .iter()
                .map(|(key, hint)| (key.clone(), MetricField::new(hint.clone())))
                .collect(),
            ResponseFormat::Integer { ge, le } => IndexMap::from([(
                format!("{}_score", self.name),
                MetricField::new(TypeHint::Int).bounded(*ge as f64, *le as f64),
            )]),
            _ => IndexMap::from([(
                format!("{}_score", self.name),
                MetricField::new(TypeHint::Str),
            )]),
        }
    }

    fn args(&self) -> IndexMap<String, Arg> {
        self.prompt.args().clone()
    }
}

/// Shapes a typed score into result fields.
pub(crate) fn score_to_result(
    name: &str,
    format: &ResponseFormat,
    score: Value,
) -> MetricResult {
    if format.is_json() {
        match score {
            Value::Object(fields) => fields.into_iter().collect(),
            other => IndexMap::from([(format!("{name}_score"), other)]),
        }
    } else {
        IndexMap::from([(format!("{name}_score"), score)])
    }
}
