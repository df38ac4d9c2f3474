use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{engine::EngineOptions, logging::LoggingConfig, network::ConnectionConfig};

/// Префикс переменных окружения; вложенность через `__`.
pub const ENV_PREFIX: &str = "SPACESTORE";
/// Файл настроек, который читается из рабочего каталога, если есть.
pub const DEFAULT_CONFIG_FILE: &str = "spacestore.toml";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Настройки сервера.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_address: SocketAddr,
    pub connection: ConnectionSettings,
    pub kv: KvSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingConfig,
    pub seed: SeedSettings,
}

/// Лимиты и таймауты соединений.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub idle_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub outbound_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KvSettings {
    /// Период фоновой очистки просроченных ключей
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Период удаления подписчиков с мёртвыми соединениями
    pub cleanup_interval_secs: u64,
    /// Сообщений в одном пакете доставки подписчику
    pub batch_size: usize,
    /// Сколько пакет ждёт добора после первого сообщения
    pub batch_timeout_ms: u64,
}

/// Встроенный администратор in-memory провайдера.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    pub admin_name: String,
    pub admin_password: String,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Settings {
    /// Собирает настройки: значения по умолчанию, затем файл, затем
    /// `SPACESTORE_*`.
    ///
    /// Явно заданный `path` обязан существовать; `spacestore.toml` из
    /// рабочего каталога необязателен.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.connection;
        let checks = [
            (c.max_connections == 0, "connection.max_connections must be > 0"),
            (
                c.max_connections_per_ip == 0,
                "connection.max_connections_per_ip must be > 0",
            ),
            (c.idle_timeout_secs == 0, "connection.idle_timeout_secs must be > 0"),
            (c.write_timeout_secs == 0, "connection.write_timeout_secs must be > 0"),
            (
                c.outbound_queue_capacity == 0,
                "connection.outbound_queue_capacity must be > 0",
            ),
            (self.kv.sweep_interval_ms == 0, "kv.sweep_interval_ms must be > 0"),
            (
                self.broker.cleanup_interval_secs == 0,
                "broker.cleanup_interval_secs must be > 0",
            ),
            (self.broker.batch_size == 0, "broker.batch_size must be > 0"),
            (
                self.broker.batch_timeout_ms == 0,
                "broker.batch_timeout_ms must be > 0",
            ),
            (self.seed.admin_name.is_empty(), "seed.admin_name must not be empty"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(ConfigError::Message((*msg).to_string())),
            None => Ok(()),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let c = &self.connection;
        ConnectionConfig {
            max_connections: c.max_connections,
            max_connections_per_ip: c.max_connections_per_ip,
            idle_timeout: Duration::from_secs(c.idle_timeout_secs),
            write_timeout: Duration::from_secs(c.write_timeout_secs),
            outbound_queue_capacity: c.outbound_queue_capacity,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sweep_interval: Duration::from_millis(self.kv.sweep_interval_ms),
            cleanup_interval: Duration::from_secs(self.broker.cleanup_interval_secs),
            batch_size: self.broker.batch_size,
            batch_timeout: Duration::from_millis(self.broker.batch_timeout_ms),
        }
    }
}

impl SeedSettings {
    pub fn uses_default_password(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], 7070)),
            connection: ConnectionSettings::default(),
            kv: KvSettings::default(),
            broker: BrokerSettings::default(),
            logging: LoggingConfig::default(),
            seed: SeedSettings::default(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_connections_per_ip: 128,
            idle_timeout_secs: 60,
            write_timeout_secs: 10,
            outbound_queue_capacity: 1024,
        }
    }
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 60,
            batch_size: 10,
            batch_timeout_ms: 100,
        }
    }
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            admin_name: "admin".into(),
            admin_password: DEFAULT_ADMIN_PASSWORD.into(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;

    const VARS: &[&str] = &[
        "SPACESTORE_LISTEN_ADDRESS",
        "SPACESTORE_CONNECTION__MAX_CONNECTIONS",
        "SPACESTORE_KV__SWEEP_INTERVAL_MS",
        "SPACESTORE_BROKER__CLEANUP_INTERVAL_SECS",
        "SPACESTORE_BROKER__BATCH_SIZE",
    ];

    fn clear_env() {
        for v in VARS {
            env::remove_var(v);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let s = Settings::load(None).unwrap();
        assert_eq!(s.listen_address, "127.0.0.1:7070".parse().unwrap());
        assert_eq!(s.connection.max_connections, 1024);
        assert_eq!(s.connection.max_connections_per_ip, 128);
        assert_eq!(s.kv.sweep_interval_ms, 1000);
        assert_eq!(s.broker.cleanup_interval_secs, 60);
        assert!(s.seed.uses_default_password());

        let cc = s.connection_config();
        assert_eq!(cc.idle_timeout, Duration::from_secs(60));
        assert_eq!(cc.outbound_queue_capacity, 1024);
        assert_eq!(s.engine_options().sweep_interval, Duration::from_millis(1000));
        assert_eq!(s.broker.batch_size, 10);
        assert_eq!(s.engine_options().batch_timeout, Duration::from_millis(100));
    }

    /// Тест проверяет порядок источников: файл перекрывает значения по
    /// умолчанию, окружение перекрывает файл.
    #[test]
    #[serial]
    fn test_file_then_env() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
listen_address = "0.0.0.0:9000"

[connection]
max_connections = 10
idle_timeout_secs = 5

[broker]
batch_timeout_ms = 20

[seed]
admin_password = "s3cret"
"#
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.listen_address.port(), 9000);
        assert_eq!(s.connection.max_connections, 10);
        assert_eq!(s.connection.write_timeout_secs, 10);
        assert_eq!(s.engine_options().batch_timeout, Duration::from_millis(20));
        assert!(!s.seed.uses_default_password());

        env::set_var("SPACESTORE_CONNECTION__MAX_CONNECTIONS", "20");
        env::set_var("SPACESTORE_KV__SWEEP_INTERVAL_MS", "250");
        let s = Settings::load(Some(file.path())).unwrap();
        clear_env();
        assert_eq!(s.connection.max_connections, 20);
        assert_eq!(s.kv.sweep_interval_ms, 250);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        clear_env();
        let err = Settings::load(Some(Path::new("/nonexistent/spacestore.toml")));
        assert!(err.is_err());
    }

    #[test]
    #[serial]
    fn test_validation() {
        clear_env();
        env::set_var("SPACESTORE_BROKER__CLEANUP_INTERVAL_SECS", "0");
        let err = Settings::load(None).unwrap_err();
        clear_env();
        assert!(err.to_string().contains("cleanup_interval_secs"));

        env::set_var("SPACESTORE_BROKER__BATCH_SIZE", "0");
        let err = Settings::load(None).unwrap_err();
        clear_env();
        assert!(err.to_string().contains("broker.batch_size"));
    }
}
