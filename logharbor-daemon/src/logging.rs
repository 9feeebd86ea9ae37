//! Diagnostic output for the daemon itself.
//!
//! The daemon's own events go to stderr, never stdout, because stdin/stdout
//! belong to the log stream being ingested. Verbosity and encoding come from
//! `[general]`.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use logharbor_core::config::GeneralConfig;

/// Install the process-wide subscriber for daemon diagnostics.
///
/// A `RUST_LOG` directive, if present, overrides `log_level`.
/// `log_format` selects `json` (one object per line) or `pretty`
/// (multi-line, for a terminal). Call once at startup; a second call fails.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let output = match config.log_format.as_str() {
        "json" => stderr.json().boxed(),
        "pretty" => stderr.pretty().boxed(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to install {} log subscriber: {}",
                config.log_format,
                e
            )
        })
}
