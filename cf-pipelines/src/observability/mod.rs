//! Logging setup and span helpers.
//!
//! Library code only emits `tracing` events; binaries and tests decide where
//! they go by calling [`init_logging`].

mod timer;

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use timer::SpanTimer;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Human readable logs.
    #[default]
    Pretty,
}

/// Installs the global subscriber.
///
/// Levels come from `RUST_LOG` and default to `info`. Only the first call
/// has an effect.
///
/// ```rust
/// use cf_pipelines::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let installed = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("A global subscriber was already installed");
        }
    });
}

/// Creates the span covering one pipeline run.
#[must_use]
pub fn pipeline_span(pipeline: &str, run_id: &str) -> Span {
    tracing::info_span!("pipeline", pipeline = pipeline, run_id = run_id)
}

/// Creates the span covering one function invocation.
#[must_use]
pub fn function_span(function: &str, group: &str) -> Span {
    tracing::info_span!("function", function = function, group = group)
}
