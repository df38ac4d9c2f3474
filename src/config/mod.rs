//! Настройки процесса: значения по умолчанию, `spacestore.toml` и
//! переменные `SPACESTORE_*`.

pub mod settings;

pub use settings::{
    BrokerSettings, ConnectionSettings, KvSettings, SeedSettings, Settings, DEFAULT_CONFIG_FILE,
    ENV_PREFIX,
};
