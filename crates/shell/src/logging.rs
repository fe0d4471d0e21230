//! Logging setup
//!
//! Logs go to stderr by default. Child output also lands on the terminal, so
//! anything above `warn` is better sent to a file.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `procbridge=warn`)
//! - `PROCBRIDGE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `PROCBRIDGE_LOG_DIR`: write daily rolling log files there instead of stderr
//!
//! ```text
//! RUST_LOG=procbridge=debug PROCBRIDGE_LOG_DIR=~/.procbridge/logs \
//!     procbridge run ./tool.sh
//! ```

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "PROCBRIDGE_LOG_FORMAT";
pub const LOG_DIR_ENV: &str = "PROCBRIDGE_LOG_DIR";

const DEFAULT_FILTER: &str = "procbridge=warn";
const LOG_FILE_PREFIX: &str = "procbridge.log";

/// Install the global subscriber
///
/// The returned guard flushes the file writer; keep it alive until exit.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Invalid log filter")?;

    let (writer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        Err(_) => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let to_file = guard.is_some();

    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        _ => registry
            .with(fmt::layer().pretty().with_ansi(!to_file).with_writer(writer))
            .try_init(),
    }
    .context("Failed to install log subscriber")?;

    Ok(guard)
}
