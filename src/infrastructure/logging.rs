//! Logging system configuration and initialization
//!
//! Console logging via `tracing-subscriber` with an `EnvFilter`, plus
//! optional daily-rolling file output. `RUST_LOG` overrides the
//! configured level.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the process lifetime.
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize the logging system with default configuration.
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize console (and optionally file) logging.
///
/// Calling this twice is an error from the subscriber registry; callers
/// initialize once at startup.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log filter directive")?;

    let console_layer = fmt::layer().with_target(true);

    if config.log_to_file {
        let dir = config.log_dir.as_deref().unwrap_or("logs");
        let file_appender = rolling::daily(dir, "supplier-sync.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        let file_layer = fmt::layer().with_ansi(false).with_writer(writer);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    }

    tracing::info!("Logging initialized (level: {})", config.level);
    Ok(())
}
