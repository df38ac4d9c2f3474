//! Логирование: фильтры, форматы, консольный и файловый вывод.

pub mod config;
mod filters;
pub mod formats;
pub mod handle;
pub mod sinks;

use std::path::PathBuf;

pub use config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ошибки настройки логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    #[error("invalid log format: {0} (expected json, pretty or compact)")]
    InvalidFormat(String),
    #[error("file_prefix must not be empty when log_dir is set")]
    InvalidFilePrefix,
    #[error("cannot create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Устанавливает глобальный подписчик.
///
/// Переменные окружения применяются поверх `config`. Возвращённый handle
/// нужно держать до выхода из процесса.
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides()?;
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console_enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = match sinks::file::layer_with_config(&config) {
        Some((layer, guard)) => {
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        log_dir = ?config.log_dir,
        "logging initialized"
    );

    Ok(LoggingHandle::new(file_guard, config.log_dir))
}
