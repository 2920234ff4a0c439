//! Tracing subscriber setup.
//!
//! Library code only emits events; installing a subscriber is left to the
//! binary or the serving shell.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

static INIT: OnceLock<()> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Another global subscriber was installed first.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Install a fmt subscriber filtered at `level`; `RUST_LOG` takes
/// precedence when set.
///
/// Subsequent calls are no-ops.
pub fn init_tracing(level: &str) -> Result<(), LoggingError> {
    if INIT.get().is_some() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = Registry::default().with(filter).with(fmt::layer());
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = INIT.set(());

    tracing::debug!(level, "logging initialized");
    Ok(())
}
