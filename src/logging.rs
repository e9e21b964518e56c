//! Logging setup.
//!
//! Logs go to stderr by default. A daily rolling file or, on Linux, the
//! systemd journal can be selected through `[logging] target`.
//!
//! Log level is controlled via the `FACEFINDER_LOG` environment variable:
//! - `FACEFINDER_LOG=debug` for per-stage detection counts
//! - `FACEFINDER_LOG=info` for standard output (default)
//! - `FACEFINDER_LOG=warn` for skipped regions and errors only

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogTarget, LoggingConfig};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("FACEFINDER_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system. Call once at startup.
pub fn init(config: &LoggingConfig) -> Result<()> {
    match config.target {
        LogTarget::Stderr => init_stderr(),
        LogTarget::File => init_file(config),
        LogTarget::Journald => init_journald(),
    }
}

fn init_stderr() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

fn init_file(config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;

    let file_appender = tracing_appender::rolling::daily(&config.directory, "facefinder.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::info!("Logging initialized with file backend at {:?}", config.directory);
    Ok(())
}

#[cfg(target_os = "linux")]
fn init_journald() -> Result<()> {
    match tracing_journald::layer() {
        Ok(journald_layer) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald_layer)
                .try_init()?;
            tracing::info!("Logging initialized with journald backend");
            Ok(())
        }
        Err(e) => {
            init_stderr()?;
            tracing::warn!(error = %e, "journald unavailable, logging to stderr");
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn init_journald() -> Result<()> {
    init_stderr()?;
    tracing::warn!("journald is only available on Linux, logging to stderr");
    Ok(())
}
