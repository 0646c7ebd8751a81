use thiserror::Error;

/// Invalid environment or provider configuration. Aborts a run before any
/// metric executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{var}` is not set")]
    MissingEnv { var: String },

    #[error("unknown provider `{provider}` (registered: {registered:?})")]
    UnknownProvider {
        provider: String,
        registered: Vec<String>,
    },

    #[error("invalid model identifier `{model}`, expected `provider:model`")]
    InvalidModel { model: String },

    #[error("{0}")]
    Invalid(String),
}

/// Malformed dataset input. A dataset that fails to load never reaches the
/// runner.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset file")]
    Io(#[from] std::io::Error),

    #[error("malformed record on line {line}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse manifest")]
    Manifest(#[from] serde_yaml::Error),

    #[error("record {index} is missing required field `{field}`")]
    MissingField { field: String, index: usize },

    #[error("field `{field}` declared as `{declared}` but record {index} holds `{found}`")]
    TypeConflict {
        field: String,
        declared: String,
        found: String,
        index: usize,
    },

    #[error("unknown field `{field}`")]
    UnknownField { field: String },

    #[error("dataset has no records")]
    Empty,

    #[error(transparent)]
    TypeHint(#[from] TypeHintError),
}

/// A type-hint string that does not follow the canonical
/// `Origin[Arg1, Arg2, …]` encoding.
#[derive(Debug, Error)]
#[error("cannot parse type hint `{text}`")]
pub struct TypeHintError {
    pub text: String,
}

/// The pipeline references something that does not exist, or a metric plan
/// cannot be satisfied against the results. Raised before any metric runs.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("module `{name}` already exists")]
    DuplicateModule { name: String },

    #[error("module name cannot be empty")]
    EmptyModuleName,

    #[error("metric `{metric}` attached twice to module `{module}`")]
    DuplicateMetric { module: String, metric: String },

    #[error("test `{test}` attached twice to module `{module}`")]
    DuplicateTest { module: String, test: String },

    #[error("module `{name}` not found")]
    UnknownModule { name: String },

    #[error("dataset field `{name}` not found")]
    UnknownField { name: String },

    #[error("module `{module}` has no metric `{metric}`")]
    UnknownMetric { module: String, metric: String },

    #[error(
        "field `{field}` bound as `{bound}` but the dataset declares `{declared}` (origins differ)"
    )]
    FieldTypeMismatch {
        field: String,
        bound: String,
        declared: String,
    },

    #[error("sample {index} has no output slot for module `{module}`")]
    MissingSlot { module: String, index: usize },

    #[error("uid `{uid}` from the log does not appear in the dataset")]
    UnknownUid { uid: String },

    #[error("no evaluation samples to run the metrics on")]
    NoSamples,

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// A prompt render saw an unknown placeholder or a missing required
/// argument.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("system prompt is required")]
    EmptySystemPrompt,

    #[error("user prompt is required")]
    EmptyUserPrompt,

    #[error("missing arguments in prompt: {names:?}")]
    MissingArgs { names: Vec<String> },

    #[error("extra arguments in prompt: {names:?}")]
    ExtraArgs { names: Vec<String> },

    #[error("missing required argument `{name}`")]
    MissingRequired { name: String },

    #[error("template error")]
    Template(#[from] minijinja::Error),

    #[error("invalid serialized prompt: {0}")]
    InvalidSerialized(String),

    #[error(transparent)]
    TypeHint(#[from] TypeHintError),
}

/// A scorer could not interpret an LLM response. Recovered locally by the
/// scorer's fallback value wherever one is defined.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("no matching categories found in response")]
    NoCategory,

    #[error("response is not valid JSON even after repair")]
    UnparseableJson,
}

/// Failure surfaced by an external provider adapter. Treated as a metric
/// runtime error by the batch executor.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider does not support {feature}")]
    Unsupported { feature: String },

    #[error("provider call failed: {0}")]
    Adapter(String),
}

/// Any failure inside a single metric invocation. Contained per sample: the
/// batch records a placeholder result and continues.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric argument `{name}` is missing")]
    MissingArg { name: String },

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Runtime(String),
}
