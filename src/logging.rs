//! Diagnostic logging.
//!
//! The terminal belongs to the host UI, so events only ever go to a file. Nothing is installed
//! unless `TAPE_NAV_LOG_FILE` is set.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;
use crate::error::LoggingError;

/// Installs a global fmt subscriber writing to `config.log_file`.
///
/// Returns `Ok(false)` when no file is configured or another subscriber is already installed.
pub fn init(config: &EnvConfig) -> Result<bool, LoggingError> {
    let Some(path) = config.log_file.as_ref() else {
        return Ok(false);
    };

    let filter = build_filter(&config.log_filter)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenLogFile {
            path: path.clone(),
            source,
        })?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .is_ok();
    Ok(installed)
}

fn build_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives).map_err(|source| LoggingError::InvalidFilter {
        filter: directives.to_string(),
        source,
    })
}
