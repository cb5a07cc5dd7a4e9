// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging setup: `tracing` + `tracing-subscriber` with an `EnvFilter`,
//! a compact or JSON formatter selected by config, and a non-blocking
//! rolling file appender for the daemon's own log.

use crate::config::{Config, LogFormat};
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {0}: {1}")]
    CreateDir(std::path::PathBuf, std::io::Error),
}

/// Installs the global subscriber. The returned guard must be held for
/// the lifetime of the process — dropping it stops the non-blocking
/// writer from flushing.
pub fn init(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LoggingError> {
    std::fs::create_dir_all(&config.log.directory)
        .map_err(|e| LoggingError::CreateDir(config.log.directory.clone(), e))?;

    let file_appender = tracing_appender::rolling::daily(&config.log.directory, &config.log.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(non_blocking))
                .init();
        }
    }

    Ok(guard)
}
