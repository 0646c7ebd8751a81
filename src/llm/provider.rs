use serde::{Deserialize, Serialize};

use crate::core::ProviderError;
use crate::metrics::base::response::ResponseFormat;

/// A fully rendered prompt, ready to hand to a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// One of the top-K alternatives the model considered at a token position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopLogprob {
    pub token: String,
    pub logprob: f64,
}

/// Log-probability data for one sampled token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogprob>,
}

/// Structured completion returned by [`Provider::parse`], consumed by
/// probabilistic metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub content: String,
    pub logprobs: Vec<TokenLogprob>,
}

/// Boundary contract every LLM adapter implements. Adapters own their retry
/// and timeout policy; the engine treats any error as a per-sample metric
/// failure.
pub trait Provider: Send + Sync {
    /// Plain text completion.
    fn run(&self, prompt: &RenderedPrompt, temperature: f64) -> Result<String, ProviderError>;

    /// Structured completion with top-logprobs at each sampled token. Only
    /// needed by probabilistic metrics; the default declines.
    fn parse(
        &self,
        prompt: &RenderedPrompt,
        temperature: f64,
        top_logprobs: usize,
        response_format: &ResponseFormat,
    ) -> Result<ParsedResponse, ProviderError> {
        let _ = (prompt, temperature, top_logprobs, response_format);
        Err(ProviderError::Unsupported {
            feature: "top_logprobs".to_string(),
        })
    }
}
