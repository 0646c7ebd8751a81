use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::ProviderError;
use crate::llm::{ParsedResponse, Provider, RenderedPrompt, TokenLogprob};
use crate::metrics::base::response::ResponseFormat;

/// Canned-response provider for tests and offline runs.
///
/// Cycles through the configured responses in submission order. When built
/// with [`with_logprobs`](StaticProvider::with_logprobs) it also serves the
/// structured [`Provider::parse`] extension used by probabilistic metrics.
pub struct StaticProvider {
    responses: Vec<String>,
    logprobs: Option<Vec<TokenLogprob>>,
    cursor: AtomicUsize,
}

impl StaticProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            responses: vec![response.into()],
            logprobs: None,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn cycling(responses: Vec<String>) -> Self {
        Self {
            responses,
            logprobs: None,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_logprobs(content: impl Into<String>, logprobs: Vec<TokenLogprob>) -> Self {
        Self {
            responses: vec![content.into()],
            logprobs: Some(logprobs),
            cursor: AtomicUsize::new(0),
        }
    }

    fn next_response(&self) -> Result<String, ProviderError> {
        if self.responses.is_empty() {
            return Err(ProviderError::Adapter(
                "static provider has no responses".to_string(),
            ));
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        Ok(self.responses[idx].clone())
    }
}

impl Provider for StaticProvider {
    fn run(&self, _prompt: &RenderedPrompt, _temperature: f64) -> Result<String, ProviderError> {
        self.next_response()
    }

    fn parse(
        &self,
        _prompt: &RenderedPrompt,
        _temperature: f64,
        _top_logprobs: usize,
        _response_format: &ResponseFormat,
    ) -> Result<ParsedResponse, ProviderError> {
        match &self.logprobs {
            Some(logprobs) => Ok(ParsedResponse {
                content: self.next_response()?,
                logprobs: logprobs.clone(),
            }),
            None => Err(ProviderError::Unsupported {
                feature: "top_logprobs".to_string(),
            }),
        }
    }
}
