use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ConfigError, EnvOptions};
use crate::llm::Provider;

/// Builds a provider adapter for a concrete model identifier (the part after
/// the `provider:` prefix).
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn Provider> + Send + Sync>;

/// Maps `"provider:model"` strings to adapter factories.
///
/// The registry is a plug-point passed explicitly to everything that needs a
/// model, never a singleton hidden behind constructors.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, provider: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        self.factories.insert(provider.into(), Arc::new(factory));
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolves a `"provider:model"` string to an adapter instance.
    pub fn get(&self, model: &str) -> Result<Arc<dyn Provider>, ConfigError> {
        let (provider, model_id) = model.split_once(':').ok_or_else(|| {
            ConfigError::InvalidModel {
                model: model.to_string(),
            }
        })?;
        let factory =
            self.factories
                .get(provider)
                .ok_or_else(|| ConfigError::UnknownProvider {
                    provider: provider.to_string(),
                    registered: self.providers(),
                })?;
        Ok(factory(model_id))
    }

    /// The default `"provider:model"` identifier from `DEFAULT_EVAL_MODEL`.
    pub fn default_model(&self) -> Result<String, ConfigError> {
        EnvOptions::from_env()
            .default_eval_model
            .ok_or(ConfigError::MissingEnv {
                var: crate::core::DEFAULT_EVAL_MODEL.to_string(),
            })
    }

    /// The default model for probabilistic metrics, falling back to the
    /// general default when the dedicated variable is unset.
    pub fn default_probabilistic_model(&self) -> Result<String, ConfigError> {
        let opts = EnvOptions::from_env();
        opts.default_probabilistic_model
            .or(opts.default_eval_model)
            .ok_or(ConfigError::MissingEnv {
                var: crate::core::DEFAULT_PROBABILISTIC_METRIC_MODEL.to_string(),
            })
    }

    /// Resolves an optional explicit model, defaulting from the environment.
    pub fn resolve(
        &self,
        model: Option<&str>,
    ) -> Result<(String, Arc<dyn Provider>), ConfigError> {
        let model = match model {
            Some(m) => m.to_string(),
            None => self.default_model()?,
        };
        let provider = self.get(&model)?;
        Ok((model, provider))
    }
}
