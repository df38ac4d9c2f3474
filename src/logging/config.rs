use std::{env, path::PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::LoggingError;

pub const ENV_LOG_LEVEL: &str = "SPACESTORE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SPACESTORE_LOG_FORMAT";
pub const ENV_LOG_DIR: &str = "SPACESTORE_LOG_DIR";

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Формат вывода событий.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

/// Конфигурация логирования.
///
/// Секция `logging` файла настроек; незаданные поля берут значения по
/// умолчанию.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию: trace, debug, info, warn, error
    pub level: String,
    pub format: LogFormat,
    pub console_enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    /// Дополнительные директивы вида `spacestore::network=debug`
    pub directives: Vec<String>,
    /// Каталог для файлов с суточной ротацией. `None` отключает файловый
    /// вывод.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl LoggingConfig {
    /// Применяет `SPACESTORE_LOG_LEVEL`, `SPACESTORE_LOG_FORMAT` и
    /// `SPACESTORE_LOG_DIR`.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoggingError> {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.level = level;
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            self.format = format
                .parse()
                .map_err(|_| LoggingError::InvalidFormat(format))?;
        }
        if let Ok(dir) = env::var(ENV_LOG_DIR) {
            self.log_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if self.log_dir.is_some() && self.file_prefix.is_empty() {
            return Err(LoggingError::InvalidFilePrefix);
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: уровень и затем директивы по целям.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![self.level.to_ascii_lowercase()];
        parts.extend(self.directives.iter().filter(|d| !d.is_empty()).cloned());
        parts.join(",")
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if let Some(dir) = &self.log_dir {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::default(),
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            directives: Vec::new(),
            log_dir: None,
            file_prefix: "spacestore.log".into(),
        }
    }
}
