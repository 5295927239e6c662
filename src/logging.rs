//! Log routing for the server process.
//!
//! Every event goes to stdout. A copy is appended to `logs/docqa.log` unless `DOCQA_LOG_FILE`
//! names a different file, or is `off`.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "DOCQA_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "docqa.log";
const DEFAULT_FILTER: &str = "info,tower_http=info";

/// Where the file copy of the log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogFileTarget {
    Disabled,
    Default,
    Path(PathBuf),
}

impl LogFileTarget {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Default,
            Some(value) if value.eq_ignore_ascii_case("off") => Self::Disabled,
            Some(value) => Self::Path(PathBuf::from(value)),
        }
    }
}

/// Install the global subscriber. Filtering follows `RUST_LOG`, falling back to `info`.
///
/// Call once, after configuration has been loaded, so a `RUST_LOG` set in the env file applies.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact());

    let target = LogFileTarget::from_env_value(std::env::var(LOG_FILE_ENV).ok().as_deref());
    match file_writer(&target) {
        Some(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .compact(),
            )
            .init(),
        None => registry.init(),
    }
}

// Subscriber is not installed yet, so open failures go to stderr.
fn file_writer(target: &LogFileTarget) -> Option<NonBlocking> {
    let (non_blocking, guard) = match target {
        LogFileTarget::Disabled => return None,
        LogFileTarget::Path(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| eprintln!("Cannot open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        LogFileTarget::Default => {
            std::fs::create_dir_all(DEFAULT_LOG_DIR)
                .map_err(|err| eprintln!("Cannot create {DEFAULT_LOG_DIR}/: {err}"))
                .ok()?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_NAME,
            ))
        }
    };
    // Dropping the guard would stop the background writer.
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
