//! Асинхронный клиент SpaceStore.
//!
//! [`ClientConnection`] отвечает за транспорт и сопоставление ответов по
//! `request_id`, [`SpaceClient`] добавляет типизированные команды.

pub mod collections;
pub mod connection;
pub mod core;

pub use collections::{expires_in, BrokerCollection, KvCollection, ObjectCollection};
pub use connection::{ClientConnection, ConnectionOptions};
pub use core::{ClientConfig, SpaceClient};
