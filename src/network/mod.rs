//! Сетевой модуль SpaceStore.
//!
//! ## Подмодули
//!
//! - `banner`: баннер и строка готовности при старте сервера.
//! - `server`: цикл приёма TCP-соединений.
//! - `connection`: лимиты, чтение кадров и исходящая очередь каждого
//!   соединения.
//! - `connection_registry`: реестр живых соединений, он же приёмник
//!   доставок брокера.
//! - `connection_state`: состояние, метаданные и статистика соединения.

pub mod banner;
pub mod connection;
pub mod connection_registry;
pub mod connection_state;
pub mod server;

pub use banner::{print_banner, print_startup_log, BannerInfo};
pub use connection::{ConnectionConfig, ConnectionManager};
pub use connection_registry::{ConnectionRegistry, GlobalConnectionStats};
pub use connection_state::{ConnectionInfo, ConnectionSnapshot, ConnectionState, ConnectionStats};
pub use server::Server;
