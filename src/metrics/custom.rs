use std::sync::Arc;

use indexmap::IndexMap;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use serde_json::Value;

use crate::core::{ConfigError, MetricError};
use crate::llm::{Provider, ProviderRegistry};
use crate::metrics::base::{
    Arg, LLMMetric, Metric, MetricArgs, MetricField, MetricPrompt, MetricResult,
    ProbabilisticMetric, ResponseFormat,
};

const CUSTOM_SYS_TEMPLATE: &str = include_str!("templates/custom_metric_sys.jinja");
const CUSTOM_SYS_PROBABILISTIC_TEMPLATE: &str =
    include_str!("templates/custom_metric_sys_probabilistic.jinja");
const CUSTOM_USER_TEMPLATE: &str = include_str!("templates/custom_metric_user.jinja");

/// A worked example shown to the judge: argument values and the expected
/// result fields.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CustomExample {
    pub input: IndexMap<String, Value>,
    pub output: IndexMap<String, Value>,
}

/// Everything needed to assemble a custom LLM-judged metric.
#[derive(Debug, Clone)]
pub struct CustomMetricSpec {
    pub name: String,
    pub criteria: String,
    pub rubric: String,
    pub arguments: IndexMap<String, Arg>,
    pub examples: Option<Vec<CustomExample>>,
    pub temperature: f64,
}

impl CustomMetricSpec {
    pub fn new(
        name: impl Into<String>,
        criteria: impl Into<String>,
        rubric: impl Into<String>,
        arguments: IndexMap<String, Arg>,
    ) -> Self {
        Self {
            name: name.into(),
            criteria: criteria.into(),
            rubric: rubric.into(),
            arguments,
            examples: None,
            temperature: 1.0,
        }
    }

    pub fn examples(mut self, examples: Vec<CustomExample>) -> Self {
        self.examples = Some(examples);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A metric assembled from criteria + rubric by rendering the fixed judge
/// templates. Behaves like any other LLM-judged metric; the response format
/// is a JSON schema over the declared result fields.
pub struct CustomMetric {
    inner: LLMMetric,
    criteria: String,
}

impl CustomMetric {
    pub fn new(
        spec: CustomMetricSpec,
        response_format: IndexMap<String, MetricField>,
        model: Option<&str>,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let (model, provider) = registry.resolve(model)?;
        Self::with_provider(spec, response_format, model, provider)
    }

    pub fn with_provider(
        spec: CustomMetricSpec,
        response_format: IndexMap<String, MetricField>,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, ConfigError> {
        let schema: IndexMap<_, _> = response_format
            .iter()
            .map(|(key, field)| (key.clone(), field.type_hint.clone()))
            .collect();
        let prompt = assemble_prompt(
            CUSTOM_SYS_TEMPLATE,
            &spec,
            &serde_json::to_value(&response_format)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ResponseFormat::json(schema),
        )?;
        Ok(Self {
            inner: LLMMetric::with_provider(
                spec.name.clone(),
                prompt.described(spec.criteria.clone()),
                spec.temperature,
                model,
                provider,
            ),
            criteria: spec.criteria,
        })
    }

    pub fn help(&self) -> &str {
        &self.criteria
    }
}

impl Metric for CustomMetric {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        self.inner.call(args)
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        self.inner.schema()
    }

    fn args(&self) -> IndexMap<String, Arg> {
        self.inner.args()
    }
}

/// The probabilistic flavor of [`CustomMetric`]: same template assembly, but
/// the response format must be a finite category set so the score token has
/// a distribution to read.
pub struct ProbabilisticCustomMetric {
    inner: ProbabilisticMetric,
    criteria: String,
}

impl ProbabilisticCustomMetric {
    pub fn new(
        spec: CustomMetricSpec,
        response_format: ResponseFormat,
        model: Option<&str>,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let model = match model {
            Some(m) => m.to_string(),
            None => registry.default_probabilistic_model()?,
        };
        let provider = registry.get(&model)?;
        Self::with_provider(spec, response_format, model, provider)
    }

    pub fn with_provider(
        spec: CustomMetricSpec,
        response_format: ResponseFormat,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, ConfigError> {
        if response_format.categories().is_none() {
            return Err(ConfigError::Invalid(
                "probabilistic custom metrics do not support JSON response formats".to_string(),
            ));
        }
        let prompt = assemble_prompt(
            CUSTOM_SYS_PROBABILISTIC_TEMPLATE,
            &spec,
            &serde_json::to_value(response_format.categories().unwrap_or_default())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            response_format,
        )?;
        Ok(Self {
            inner: ProbabilisticMetric::with_provider(
                spec.name.clone(),
                prompt.described(spec.criteria.clone()),
                spec.temperature,
                model,
                provider,
            )?,
            criteria: spec.criteria,
        })
    }

    pub fn help(&self) -> &str {
        &self.criteria
    }
}

impl Metric for ProbabilisticCustomMetric {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        self.inner.call(args)
    }

    fn schema(&self) -> IndexMap<String, MetricField> {
        self.inner.schema()
    }

    fn args(&self) -> IndexMap<String, Arg> {
        self.inner.args()
    }
}

/// Renders the fixed system/user templates into a [`MetricPrompt`]. The user
/// template re-emits one `{{ name }}` placeholder per declared argument, so
/// the assembled prompt binds like a hand-written one.
fn assemble_prompt(
    sys_template: &str,
    spec: &CustomMetricSpec,
    response_format_ctx: &Value,
    response_format: ResponseFormat,
) -> Result<MetricPrompt, ConfigError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    let context = minijinja::context! {
        criteria => spec.criteria,
        rubric => spec.rubric,
        examples => spec.examples,
        arguments => spec.arguments,
        response_format => response_format_ctx,
    };
    let render = |source: &str| -> Result<String, ConfigError> {
        env.template_from_str(source)
            .and_then(|t| t.render(&context))
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    };
    let system_prompt = render(sys_template)?;
    let user_prompt = render(CUSTOM_USER_TEMPLATE)?;
    MetricPrompt::new(
        system_prompt,
        user_prompt,
        response_format,
        Some(spec.arguments.clone()),
    )
    .map_err(|e| ConfigError::Invalid(e.to_string()))
}
