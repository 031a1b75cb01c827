/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Installs the process-wide `tracing` subscriber.

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::common::config::TracingConfig;
use crate::common::Process;

/// Errors raised by [`init`].
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("failed to create log directory {directory}: {source}")]
    Directory {
        /// Directory that failed.
        directory: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The log file could not be opened.
    #[error("failed to open log file: {0}")]
    Appender(#[from] InitError),
    /// A global subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Keeps the non-blocking file writer alive. Dropping it flushes and stops
/// file logging.
#[derive(Debug)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Installs a formatted subscriber filtered by `RUST_LOG`, or by
/// `config.level` when the variable is unset.
///
/// With `config.file_enabled`, records are also written to
/// `config.log_directory/config.log_file` (after `%appname%`/`%pid%`
/// expansion) through a non-blocking appender.
///
/// # Errors
///
/// Returns [`LoggingError::Directory`] if the log directory cannot be created,
/// [`LoggingError::Appender`] if the log file cannot be opened and
/// [`LoggingError::AlreadyInstalled`] if a global subscriber exists.
pub fn init(config: &TracingConfig) -> Result<LogGuard, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = FmtSubscriber::builder()
        .with_span_events(FmtSpan::NONE)
        .compact()
        .with_line_number(true)
        .with_thread_names(true)
        .with_target(true)
        .with_env_filter(filter);

    if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory).map_err(|source| {
            LoggingError::Directory {
                directory: config.log_directory.clone(),
                source,
            }
        })?;
        let file_name = Process::current().expand_template(&config.log_file);
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(&config.log_directory)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let subscriber = builder
            .with_writer(std::io::stderr.and(non_blocking))
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|_| LoggingError::AlreadyInstalled)?;
        Ok(LogGuard { _file: Some(guard) })
    } else {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|_| LoggingError::AlreadyInstalled)?;
        Ok(LogGuard { _file: None })
    }
}
