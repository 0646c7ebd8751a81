use anyhow::bail;

use crate::metrics::MetricResult;

/// A boolean gate over the merged per-sample metric values of one module.
pub trait Test: Send + Sync {
    fn name(&self) -> String;

    fn run(&self, samples: &[MetricResult]) -> anyhow::Result<bool>;
}

/// Passes when every sample's named metric field is at least the threshold.
/// A sample whose field is missing or non-numeric (a placeholder from a
/// failed metric) fails the gate.
pub struct GreaterOrEqualThan {
    pub name: String,
    pub field: String,
    pub threshold: f64,
}

impl GreaterOrEqualThan {
    pub fn new(name: impl Into<String>, field: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            threshold,
        }
    }
}

impl Test for GreaterOrEqualThan {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn run(&self, samples: &[MetricResult]) -> anyhow::Result<bool> {
        if samples.is_empty() {
            bail!("no samples to test");
        }
        Ok(samples.iter().all(|sample| {
            sample
                .get(&self.field)
                .and_then(|v| v.as_f64())
                .map(|v| v >= self.threshold)
                .unwrap_or(false)
        }))
    }
}

/// Passes when the arithmetic mean of the named field across samples is at
/// least the threshold. Non-numeric values are excluded from the mean.
pub struct MeanGreaterOrEqualThan {
    pub name: String,
    pub field: String,
    pub threshold: f64,
}

impl MeanGreaterOrEqualThan {
    pub fn new(name: impl Into<String>, field: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            threshold,
        }
    }
}

impl Test for MeanGreaterOrEqualThan {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn run(&self, samples: &[MetricResult]) -> anyhow::Result<bool> {
        let values: Vec<f64> = samples
            .iter()
            .filter_map(|sample| sample.get(&self.field).and_then(|v| v.as_f64()))
            .collect();
        if values.is_empty() {
            bail!("field `{}` has no numeric values", self.field);
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Ok(mean >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Value;

    use super::*;

    fn recall_samples(values: &[f64]) -> Vec<MetricResult> {
        values
            .iter()
            .map(|&v| IndexMap::from([("context_recall".to_string(), Value::from(v))]))
            .collect()
    }

    #[test]
    fn mean_gate_passes_where_all_samples_gate_fails() {
        let samples = recall_samples(&[1.0, 0.9, 0.7]);

        let mean = MeanGreaterOrEqualThan::new("Recall", "context_recall", 0.8);
        assert!(mean.run(&samples).unwrap());

        let all = GreaterOrEqualThan::new("RecallAll", "context_recall", 0.8);
        assert!(!all.run(&samples).unwrap());
    }

    #[test]
    fn missing_field_fails_the_all_samples_gate() {
        let mut samples = recall_samples(&[1.0, 1.0]);
        samples.push(IndexMap::from([(
            "context_recall".to_string(),
            Value::Null,
        )]));

        let all = GreaterOrEqualThan::new("RecallAll", "context_recall", 0.5);
        assert!(!all.run(&samples).unwrap());
    }
}
