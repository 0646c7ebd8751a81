use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::core::EnvOptions;

const DEFAULT_PRETTY_FILTER: &str = "ragcheck=info";
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid tracing filter directive `{directive}`: {source}")]
    InvalidFilter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs process-global, pretty tracing output.
///
/// Behavior:
/// - Uses `RUST_LOG` when present.
/// - Falls back to `ragcheck=info` when `RUST_LOG` is unset/invalid.
/// - Is idempotent: repeated calls are no-ops after first successful init.
pub fn init_tracing() -> Result<(), TelemetryInitError> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = resolve_filter()?;
    let subscriber = tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

fn resolve_filter() -> Result<EnvFilter, TelemetryInitError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(DEFAULT_PRETTY_FILTER).map_err(|source| {
            TelemetryInitError::InvalidFilter {
                directive: DEFAULT_PRETTY_FILTER.to_string(),
                source,
            }
        }),
    }
}

static USAGE_COUNTERS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

/// Increments an anonymous, process-wide usage counter. Increment-only and
/// non-authoritative; a no-op when `CONTINUOUS_EVAL_DO_NOT_TRACK` is set.
pub fn track_event(event: &str) {
    if EnvOptions::from_env().do_not_track {
        return;
    }
    let counters = USAGE_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(mut counters) = counters.lock() {
        *counters.entry(event.to_string()).or_insert(0) += 1;
    }
}

/// Snapshot of the usage counters, for diagnostics.
pub fn usage_counters() -> HashMap<String, u64> {
    USAGE_COUNTERS
        .get()
        .and_then(|counters| counters.lock().ok().map(|c| c.clone()))
        .unwrap_or_default()
}
