//! Logging setup.
//!
//! The library itself only emits `tracing` events; the embedding process
//! decides where they go. [`init_tracing`] is a convenience for binaries and
//! tests that want sensible defaults.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: OnceLock<()> = OnceLock::new();

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output (default).
    #[default]
    Text,
    /// JSON lines, for log shippers.
    Json,
}

/// Initializes the global tracing subscriber.
///
/// Filtering follows `RAGSTORE_LOG` (falling back to `RUST_LOG`, then
/// `info`). Safe to call more than once; only the first call installs a
/// subscriber.
pub fn init_tracing(format: LogFormat) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("RAGSTORE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match format {
            LogFormat::Text => registry
                .with(tracing_subscriber::fmt::layer().with_target(true))
                .try_init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init(),
        };
        // A subscriber installed by the host process wins silently.
        drop(result);
    });
}
