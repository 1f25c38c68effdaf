use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::sync::PoisonError;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "sidekick.log";

/// Held here rather than on `main`'s stack so the interrupt handler, which
/// exits without unwinding, can still flush.
static LOG_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// File logging under `dir`, plus stderr when `verbose`. Call [`flush`]
/// before the process exits or buffered lines are lost.
pub fn init(dir: &Path, verbose: bool) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let file_appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    *LOG_GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
    Ok(())
}

/// Writes out buffered log lines. Later calls are no-ops.
pub fn flush() {
    release(&LOG_GUARD);
}

fn release(slot: &Mutex<Option<WorkerGuard>>) {
    let guard = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    drop(guard);
}
