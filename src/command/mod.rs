//! Обработка команд: обработчики, цепочка middleware и диспетчер.
//!
//! Таблица `command_id → обработчик` строится один раз при старте
//! ([`Dispatcher::new`]). Каждый обработчик, кроме команд входа, обёрнут в
//! проверку принципала и проверку прав на базу данных.

pub mod broker;
pub mod catalog;
pub mod dispatcher;
pub mod kv;
pub mod middleware;
pub mod object;
pub mod payload;
pub mod session;
pub mod system;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use spacestore_error::{SpaceResult, StatusCode};

pub use dispatcher::Dispatcher;
pub use middleware::{authorize, Authenticated, DatabaseAccess};
pub use payload::Payload;
pub use session::Session;

use crate::{
    auth::AuthManager,
    catalog::Catalog,
    codec::Value,
    engine::{Engine, EngineRegistry},
    protocol::Command,
};

/// Общие зависимости обработчиков.
pub struct Services {
    pub catalog: Arc<dyn Catalog>,
    pub engines: Arc<EngineRegistry>,
    pub auth: AuthManager,
}

/// Вызов обработчика: команда, соединение и общие зависимости.
#[derive(Clone, Copy)]
pub struct Request<'a> {
    pub command: &'a Command,
    pub session: &'a Session,
    pub services: &'a Services,
}

/// Успешный результат обработчика.
///
/// Статус может быть не `Ok`: штатные промахи (`Exists`, `GetTTL`)
/// возвращаются как `NotFound` без тела и без ошибки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Обработчик одной команды.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply>;
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Reply {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::Ok,
            body: body.into(),
        }
    }

    pub fn empty() -> Self {
        Self::ok(Bytes::new())
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NotFound,
            body: Bytes::new(),
        }
    }

    /// Тело из одного закодированного значения.
    pub fn value(value: &Value) -> SpaceResult<Self> {
        Ok(Self::ok(value.encode()?))
    }
}

impl Request<'_> {
    /// Движок коллекции, к которой обращена команда.
    pub fn engine(&self) -> SpaceResult<Engine> {
        self.services
            .engines
            .get(&self.command.database, &self.command.collection)
    }

    pub fn payload(&self) -> Payload<'_> {
        Payload::new(&self.command.body)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("engines", &self.engines)
            .finish_non_exhaustive()
    }
}
