//! Evaluation engine for LLM application pipelines.
//!
//! The engine models an application as a [`Pipeline`](eval::Pipeline) of
//! named modules over a [`Dataset`](dataset::Dataset), attaches
//! [`Metric`](metrics::Metric)s and boolean [`Test`](eval::Test) gates to
//! modules, and binds metric arguments to dataset columns and logged module
//! outputs through [`Placeholder`](eval::Placeholder) plans. Metrics run
//! per-sample in parallel with graceful degradation: a failing sample is
//! recorded as a placeholder result and the run continues.

pub mod core;
pub mod dataset;
pub mod eval;
pub mod llm;
pub mod metrics;
pub mod utils;

pub use crate::core::*;
pub use crate::dataset::*;
pub use crate::eval::*;
pub use crate::llm::*;
pub use crate::metrics::*;
pub use crate::utils::*;
