//! Движки коллекций.
//!
//! - `kv`: ключ-значение с абсолютным TTL и учётом размера.
//! - `broker`: pub/sub с очередями-группами, пакетной доставкой и удалением
//!   мёртвых подписчиков.
//! - `object`: встроенное хранилище бинарных объектов.
//! - `registry`: привязка `(database, collection)` к экземпляру движка.

pub mod broker;
pub mod kv;
pub mod object;
pub mod registry;

pub use broker::{
    subject_matches, BrokerEngine, BrokerStats, ConnectionSink, DeliveryOptions, Subscriber,
};
pub use kv::{system_clock, Clock, KvEngine, SetCondition};
pub use object::{ObjectEngine, ObjectMetadata};
pub use registry::{Engine, EngineOptions, EngineRegistry};
