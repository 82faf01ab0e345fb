//! # Logging Initialization
//!
//! Sets up the global `tracing` subscriber for the `settle` binary. Library code
//! only emits events; installing a subscriber is left to the host.
//!
//! - **Environment Filter**: `RUST_LOG` wins. Otherwise the requested level
//!   applies to everything and `settle` itself logs at `debug`.
//! - **Stderr (default)**: ANSI colours enabled.
//! - **File (opt-in)**: daily rolling file in the user cache directory, no ANSI.
//!   Falls back to stderr if the directory cannot be determined or written.
//!
//! Initialization runs at most once per process.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    // try_init: a test harness may already have installed a subscriber
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("trace"))
            .with(layer().with_test_writer())
            .try_init();
    });
}

/// Initializes the logging system.
///
/// # Errors
///
/// Currently infallible; the `Result` leaves room for sinks that can fail.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},settle=debug")));

        if log_to_file && let Some(proj_dirs) = ProjectDirs::from("com", "Settle", "settle") {
            let log_dir = proj_dirs.cache_dir();

            // tracing_appender::rolling::daily panics when the directory is not writable
            if can_write_to(log_dir) {
                let file_appender = tracing_appender::rolling::daily(log_dir, "settle.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed at exit
                Box::leak(Box::new(guard));
                return;
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

fn can_write_to(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }

    let probe = dir.join(".settle_log_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
