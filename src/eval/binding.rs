use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::eval::results::Sample;
use crate::metrics::Metric;

/// Projection applied to a resolved slot value before it is handed to a
/// metric argument.
pub type Selector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Function of the full sample slot used by [`Placeholder::Lambda`].
/// Returning `None` signals that the sample lacks what the function needs,
/// and the runner retries against the dataset record with the same uid.
pub type SampleFn = Arc<dyn Fn(&Sample) -> Option<Value> + Send + Sync>;

/// A symbolic reference to a value source, resolved by the runner into one
/// column-aligned list per metric argument before any metric executes.
#[derive(Clone)]
pub enum Placeholder {
    /// One dataset column, in record order.
    DatasetField { name: String },
    /// The output slot of a module, the owner module when `module` is unset,
    /// optionally projected through a selector.
    ModuleOutput {
        module: Option<String>,
        selector: Option<Selector>,
    },
    /// The recorded tool-call trace of an agent module.
    CalledTools {
        module: Option<String>,
        selector: Option<Selector>,
    },
    /// An arbitrary function of the full sample.
    Lambda { func: SampleFn },
}

impl Placeholder {
    pub fn dataset_field(name: impl Into<String>) -> Self {
        Placeholder::DatasetField { name: name.into() }
    }

    /// The owner module's own output.
    pub fn module_output() -> Self {
        Placeholder::ModuleOutput {
            module: None,
            selector: None,
        }
    }

    pub fn module_output_of(module: impl Into<String>) -> Self {
        Placeholder::ModuleOutput {
            module: Some(module.into()),
            selector: None,
        }
    }

    pub fn module_output_with<F>(module: Option<String>, selector: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Placeholder::ModuleOutput {
            module,
            selector: Some(Arc::new(selector)),
        }
    }

    pub fn called_tools() -> Self {
        Placeholder::CalledTools {
            module: None,
            selector: None,
        }
    }

    pub fn called_tools_of(module: impl Into<String>) -> Self {
        Placeholder::CalledTools {
            module: Some(module.into()),
            selector: None,
        }
    }

    pub fn lambda<F>(func: F) -> Self
    where
        F: Fn(&Sample) -> Option<Value> + Send + Sync + 'static,
    {
        Placeholder::Lambda {
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::DatasetField { name } => {
                f.debug_struct("DatasetField").field("name", name).finish()
            }
            Placeholder::ModuleOutput { module, .. } => f
                .debug_struct("ModuleOutput")
                .field("module", module)
                .finish(),
            Placeholder::CalledTools { module, .. } => f
                .debug_struct("CalledTools")
                .field("module", module)
                .finish(),
            Placeholder::Lambda { .. } => f.write_str("Lambda"),
        }
    }
}

/// Metric-argument name to placeholder.
pub type ParamPlan = IndexMap<String, Placeholder>;

/// A metric attached to a module, optionally carrying a parameter plan. A
/// metric with a plan ignores ambient columns whose names collide with it.
#[derive(Clone)]
pub struct BoundMetric {
    pub metric: Arc<dyn Metric>,
    pub plan: Option<ParamPlan>,
}

impl BoundMetric {
    pub fn new(metric: impl Metric + 'static) -> Self {
        Self {
            metric: Arc::new(metric),
            plan: None,
        }
    }

    pub fn from_arc(metric: Arc<dyn Metric>) -> Self {
        Self { metric, plan: None }
    }

    /// Attaches a parameter plan mapping metric-argument names to
    /// placeholders.
    pub fn use_params(mut self, plan: ParamPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn name(&self) -> String {
        self.metric.name()
    }
}

impl fmt::Debug for BoundMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMetric")
            .field("metric", &self.metric.name())
            .field("plan", &self.plan)
            .finish()
    }
}
