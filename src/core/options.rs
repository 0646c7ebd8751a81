/// Environment variable naming the default `provider:model` string.
pub const DEFAULT_EVAL_MODEL: &str = "DEFAULT_EVAL_MODEL";
/// Default model for probabilistic metrics; must expose top-logprobs.
pub const DEFAULT_PROBABILISTIC_METRIC_MODEL: &str = "DEFAULT_PROBABILISTIC_METRIC_MODEL";
/// When set truthy, every metric batch runs on a single worker.
pub const DISABLE_MULTIPROCESSING: &str = "CONTINUOUS_EVAL_DISABLE_MULTIPROCESSING";
/// When set truthy, anonymous usage counters are not recorded.
pub const DO_NOT_TRACK: &str = "CONTINUOUS_EVAL_DO_NOT_TRACK";

/// Process environment options recognized by the engine, read once at the
/// call site that needs them.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    pub default_eval_model: Option<String>,
    pub default_probabilistic_model: Option<String>,
    pub disable_multiprocessing: bool,
    pub do_not_track: bool,
}

impl EnvOptions {
    pub fn from_env() -> Self {
        Self {
            default_eval_model: non_empty_var(DEFAULT_EVAL_MODEL),
            default_probabilistic_model: non_empty_var(DEFAULT_PROBABILISTIC_METRIC_MODEL),
            disable_multiprocessing: truthy_var(DISABLE_MULTIPROCESSING),
            do_not_track: truthy_var(DO_NOT_TRACK),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn truthy_var(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
