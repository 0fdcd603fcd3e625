//! Tracing subscriber initialization.
//!
//! A stderr layer for interactive feedback plus a non-blocking rolling file
//! writer once a sandbox root exists. Initialization is idempotent — a
//! second call from a second sandbox in the same process is a no-op, since
//! `tracing` only permits one global subscriber.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: OnceLock<Option<WorkerGuard>> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SAFESPACE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber with only a stderr layer. Used by the CLI
/// before a sandbox root is known.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let stderr_layer = fmt::layer().with_ansi(true).with_target(false);
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .try_init();
        None
    });
}

/// Install the global subscriber with a stderr layer plus a rolling file
/// writer under `<root>/logs/safespace.log`.
///
/// The [`WorkerGuard`] is not returned to the caller; it is kept alive for
/// the process lifetime inside this module's static instead.
pub fn init_logging_for(logs_dir: &Path) -> std::io::Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }
    std::fs::create_dir_all(logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(logs_dir, "safespace.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
    let stderr_layer = fmt::layer().with_ansi(true).with_target(false);

    let _ = INIT.set(Some(guard));
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}
