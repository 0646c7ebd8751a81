use std::fs;
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde_json::Value;

use crate::core::BindingError;
use crate::eval::modules::ToolCall;
use crate::eval::pipeline::Pipeline;
use crate::eval::results::{PipelineResults, Sample, TOOL_PREFIX, UID_KEY};

/// How a logged value lands in its sample slot.
///
/// Append preserves submission order; when the slot holds a list and the
/// logged value is itself a list, the slot is extended rather than nested.
/// Replace overwrites the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Append,
    Replace,
}

/// Collects per-sample module outputs from a running system, keyed by uid.
/// Slots start empty in the pipeline shape and are mutated only through
/// [`log`](PipelineLogger::log). Single-writer per uid by convention.
pub struct PipelineLogger {
    empty_sample: Sample,
    samples: IndexMap<String, Sample>,
}

impl PipelineLogger {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            empty_sample: pipeline.empty_sample(),
            samples: IndexMap::new(),
        }
    }

    /// Records a module output for one sample, creating the slot on first
    /// touch.
    pub fn log(
        &mut self,
        uid: impl Into<String>,
        module: &str,
        value: impl Into<Value>,
        mode: LogMode,
    ) -> Result<(), BindingError> {
        self.write(uid.into(), module.to_string(), value.into(), mode)
    }

    /// Records a tool call on the agent module's tool trace.
    pub fn log_tool_call(
        &mut self,
        uid: impl Into<String>,
        module: &str,
        call: ToolCall,
    ) -> Result<(), BindingError> {
        let value = serde_json::to_value(call).unwrap_or(Value::Null);
        self.write(
            uid.into(),
            format!("{TOOL_PREFIX}{module}"),
            value,
            LogMode::Append,
        )
    }

    fn write(
        &mut self,
        uid: String,
        slot: String,
        value: Value,
        mode: LogMode,
    ) -> Result<(), BindingError> {
        if !self.empty_sample.contains_key(&slot) {
            return Err(BindingError::UnknownModule {
                name: slot.strip_prefix(TOOL_PREFIX).unwrap_or(&slot).to_string(),
            });
        }
        let sample = self
            .samples
            .entry(uid)
            .or_insert_with(|| self.empty_sample.clone());
        let current = sample.get_mut(&slot);
        match (mode, current) {
            (LogMode::Append, Some(Value::Array(items))) => match value {
                Value::Array(new_items) => items.extend(new_items),
                other => items.push(other),
            },
            _ => {
                sample.insert(slot, value);
            }
        }
        Ok(())
    }

    pub fn samples(&self) -> &IndexMap<String, Sample> {
        &self.samples
    }

    /// Materializes the collected logs into ordered results over the
    /// pipeline's dataset.
    pub fn results(&self, pipeline: &Pipeline) -> Result<PipelineResults, BindingError> {
        PipelineResults::from_logs(pipeline, &self.samples)
    }

    /// JSON-lines, one logged sample per line with its `__uid`.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut out = String::new();
        for (uid, sample) in &self.samples {
            let mut line = Sample::new();
            line.insert(UID_KEY.to_string(), Value::from(uid.clone()));
            line.extend(sample.clone());
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        fs::write(path.as_ref(), out)
            .with_context(|| format!("failed to write log to {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn load(pipeline: &Pipeline, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read log from {}", path.as_ref().display()))?;
        let mut logger = Self::new(pipeline);
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut sample: Sample = serde_json::from_str(line)
                .with_context(|| format!("malformed log line {}", number + 1))?;
            let uid = match sample.shift_remove(UID_KEY) {
                Some(Value::String(uid)) => uid,
                Some(other) => other.to_string(),
                None => number.to_string(),
            };
            logger.samples.insert(uid, sample);
        }
        Ok(logger)
    }
}
