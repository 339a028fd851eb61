/*!
 * Structured Tracing
 * Subscriber initialisation for the allocator's `tracing` events
 *
 * Environment variables:
 * - RUST_LOG: log level filter (default: info)
 * - MEMTRACK_TRACE_JSON: `1` or `true` for JSON output
 */

use crate::core::limits::ENV_TRACE_JSON;
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable compact lines
    Compact,
    /// One JSON object per event
    Json,
}

impl TracingFormat {
    /// Pick the format from `MEMTRACK_TRACE_JSON`
    pub fn from_env() -> Self {
        Self::from_flag(std::env::var(ENV_TRACE_JSON).ok().as_deref())
    }

    fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("1") | Some("true") => TracingFormat::Json,
            _ => TracingFormat::Compact,
        }
    }
}

/// Install the global subscriber
///
/// Returns `false` if a subscriber was already installed, which leaves that
/// one in place; safe to call from every test and from `main`.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let format = TracingFormat::from_env();
    let installed = match format {
        TracingFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok(),
        TracingFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        info!(?format, "Structured tracing initialized");
    }
    installed
}
