//! Tracing and logging setup.
//!
//! Call [`setup_tracing`] once at startup. All output goes to stderr, stdout is reserved for
//! the items and tables being browsed.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RUST_LOG` | Log filter (e.g., `warn`, `dynoscope=debug`) | `info` |
//!
//! Without the `pretty_logs` feature, lines are plain text:
//! ```text
//! WARN  pagination: Failed to fetch page: Rate exceeded [run{table="orders" generation=3}]
//! ```
//!
//! With `pretty_logs`, they are colorized, timestamped and show span nesting:
//! ```text
//! 14:32:01.234 WARN  | pagination: Failed to fetch page: Rate exceeded
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[cfg(feature = "pretty_logs")]
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(not(feature = "pretty_logs"))]
mod production;

#[cfg(feature = "pretty_logs")]
mod pretty;

/// Installs the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber was already installed.
pub fn setup_tracing() {
    Registry::default().with(setup_console_layer()).init();
    tracing::debug!(
        "Tracing initialized for {} {}",
        *crate::APP_NAME,
        *crate::APP_VERSION
    );
}

fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(feature = "pretty_logs")]
fn setup_console_layer() -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW)
        .event_format(pretty::PrettyConsoleLogFormat)
        .with_filter(console_filter())
        .boxed()
}

#[cfg(not(feature = "pretty_logs"))]
fn setup_console_layer() -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(production::ProductionLogFormat)
        .with_filter(console_filter())
        .boxed()
}

/// Strips the crate and module path shared by all our log targets.
///
/// `dynoscope::aws::dynamodb::pagination` becomes `pagination`, foreign targets are kept.
pub(crate) fn short_target(target: &str) -> &str {
    target
        .strip_prefix("dynoscope::aws::dynamodb::")
        .or_else(|| target.strip_prefix("dynoscope::"))
        .unwrap_or(target)
}
