use std::panic::{catch_unwind, AssertUnwindSafe};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use tracing::warn;

use crate::core::{EnvOptions, MetricError};
use crate::metrics::base::arg::{Arg, MetricField};

/// Keyword arguments for one metric invocation.
pub type MetricArgs = IndexMap<String, Value>;
/// Named result fields of one metric invocation.
pub type MetricResult = IndexMap<String, Value>;
/// Column-aligned argument lists: one value per sample, per argument name.
pub type Columns = IndexMap<String, Vec<Value>>;

/// The uniform metric contract the engine executes.
///
/// A metric computes a dict of named fields from per-sample kwargs. The
/// provided [`batch`](Metric::batch) runs one invocation per sample on a
/// worker pool with graceful degradation: a failing sample is recorded as a
/// schema-shaped placeholder and the run continues; a failing pool falls
/// back to a sequential pass.
pub trait Metric: Send + Sync {
    fn name(&self) -> String;

    /// One invocation per sample.
    fn call(&self, args: &MetricArgs) -> Result<MetricResult, MetricError>;

    /// Declared result fields, used to shape placeholder results for failed
    /// samples.
    fn schema(&self) -> IndexMap<String, MetricField>;

    /// Declared input arguments.
    fn args(&self) -> IndexMap<String, Arg>;

    /// CPU-bound metrics get one worker per core; IO-bound metrics (the
    /// norm for LLM judges) get a wider pool.
    fn is_cpu_bound(&self) -> bool {
        false
    }

    /// Folds per-sample results into one aggregate. The default computes the
    /// arithmetic mean of every numeric field and drops the rest.
    fn aggregate(&self, results: &[MetricResult]) -> MetricResult {
        mean_aggregate(results)
    }

    /// Per-sample parallel execution over column-aligned inputs, returning
    /// one result per sample in input order.
    fn batch(&self, columns: &Columns) -> Vec<MetricResult> {
        let total = columns.values().map(Vec::len).min().unwrap_or(0);
        let items: Vec<MetricArgs> = (0..total).map(|idx| row(columns, self, idx)).collect();

        let workers = worker_count(self.is_cpu_bound());
        if workers <= 1 {
            return self.batch_sequential(&items);
        }

        let parallel = catch_unwind(AssertUnwindSafe(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map(|pool| {
                    pool.install(|| {
                        items
                            .par_iter()
                            .map(|args| self.call_contained(args))
                            .collect::<Vec<_>>()
                    })
                })
        }));
        match parallel {
            Ok(Ok(results)) => self.finish_batch(results),
            Ok(Err(err)) => {
                warn!(metric = %self.name(), error = %err, "worker pool failed, falling back to sequential execution");
                self.batch_sequential(&items)
            }
            Err(_) => {
                warn!(metric = %self.name(), "worker pool panicked, falling back to sequential execution");
                self.batch_sequential(&items)
            }
        }
    }

    /// Single pass, no pool. Used for deterministic test runs and as the
    /// fallback path.
    fn batch_sequential(&self, items: &[MetricArgs]) -> Vec<MetricResult> {
        let results = items.iter().map(|args| self.call_contained(args)).collect();
        self.finish_batch(results)
    }

    /// Runs one sample, containing both errors and panics to a placeholder.
    fn call_contained(&self, args: &MetricArgs) -> Result<MetricResult, MetricError> {
        match catch_unwind(AssertUnwindSafe(|| self.call(args))) {
            Ok(result) => result,
            Err(_) => Err(MetricError::Runtime("metric panicked".to_string())),
        }
    }

    /// Converts contained failures into placeholders and reports the error
    /// count.
    fn finish_batch(&self, results: Vec<Result<MetricResult, MetricError>>) -> Vec<MetricResult> {
        let mut failures = 0usize;
        let schema = self.schema();
        let out = results
            .into_iter()
            .map(|result| match result {
                Ok(value) => value,
                Err(err) => {
                    failures += 1;
                    warn!(metric = %self.name(), error = %err, "metric failed on sample");
                    placeholder_result(&schema)
                }
            })
            .collect();
        if failures > 0 {
            warn!(metric = %self.name(), failures, "samples recorded with placeholder results");
        }
        out
    }
}

/// Per-sample kwargs for one row: the declared args present in the columns,
/// or every column when the metric declares none.
fn row<M: Metric + ?Sized>(columns: &Columns, metric: &M, idx: usize) -> MetricArgs {
    let declared = metric.args();
    let keys: Vec<&String> = if declared.is_empty() {
        columns.keys().collect()
    } else {
        declared.keys().filter(|k| columns.contains_key(*k)).collect()
    };
    keys.into_iter()
        .map(|key| (key.clone(), columns[key][idx].clone()))
        .collect()
}

/// Worker pool size: `min(32, 5 * cores)` for IO-bound metrics, `cores` for
/// CPU-bound ones, 1 when multiprocessing is disabled via the environment.
pub fn worker_count(cpu_bound: bool) -> usize {
    if EnvOptions::from_env().disable_multiprocessing {
        return 1;
    }
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if cpu_bound {
        cores
    } else {
        (cores * 5).min(32)
    }
}

/// The sentinel recorded for a failed sample: every declared field present,
/// numeric fields nulled. JSON carries no NaN, so `null` stands in for it.
pub fn placeholder_result(schema: &IndexMap<String, MetricField>) -> MetricResult {
    schema
        .keys()
        .map(|name| (name.clone(), Value::Null))
        .collect()
}

/// Arithmetic mean of every numeric field; non-numeric fields dropped.
pub fn mean_aggregate(results: &[MetricResult]) -> MetricResult {
    let mut sums: IndexMap<String, (f64, usize)> = IndexMap::new();
    for result in results {
        for (key, value) in result {
            if let Some(num) = value.as_f64() {
                let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                entry.0 += num;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, Value::from(sum / count as f64)))
        .collect()
}
