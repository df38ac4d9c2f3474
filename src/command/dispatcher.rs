use std::{collections::HashMap, sync::Arc, time::Instant};

use spacestore_error::{CommandError, LogLevel, StackError};
use tracing::{debug, error, info, trace, warn};

use super::{
    broker::{BrokerHandler, BROKER_COMMANDS},
    catalog::{CollectionGet, DatabaseGet},
    kv::{KvHandler, KV_COMMANDS},
    object::{ObjectHandler, OBJECT_COMMANDS},
    system::{AuthStatus, Login, Ping, SupportedVersions},
    Authenticated, DatabaseAccess, Handler, Request, Services, Session,
};
use crate::{
    catalog::PermissionLevel,
    protocol::{Command, CommandId, Response},
};

/// Таблица `command_id → обработчик` с уже применённой цепочкой
/// middleware.
pub struct Dispatcher {
    handlers: HashMap<u16, Arc<dyn Handler>>,
    services: Arc<Services>,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>) -> Self {
        let mut d = Self {
            handlers: HashMap::new(),
            services,
        };

        d.register(CommandId::Ping, Ping);
        d.register(CommandId::SupportedProtocolVersions, SupportedVersions);
        d.register(CommandId::Login, Login);
        d.register(CommandId::AuthStatus, AuthStatus);

        d.register_guarded(CommandId::DatabaseGet, DatabaseGet);
        d.register_guarded(CommandId::CollectionGet, CollectionGet);
        for &op in KV_COMMANDS {
            d.register_guarded(op, KvHandler::new(op));
        }
        for &op in OBJECT_COMMANDS {
            d.register_guarded(op, ObjectHandler::new(op));
        }
        for &op in BROKER_COMMANDS {
            d.register_guarded(op, BrokerHandler::new(op));
        }

        debug!(handlers = d.handlers.len(), "dispatcher: handler table built");
        d
    }

    fn register(
        &mut self,
        id: CommandId,
        handler: impl Handler + 'static,
    ) {
        self.handlers.insert(id.id(), Arc::new(handler));
    }

    /// Регистрирует обработчик за проверкой принципала и прав на базу.
    fn register_guarded<H: Handler + 'static>(
        &mut self,
        id: CommandId,
        handler: H,
    ) {
        let level = if id.is_mutating() {
            PermissionLevel::ReadWrite
        } else {
            PermissionLevel::ReadOnly
        };
        self.register(id, Authenticated::new(DatabaseAccess::new(handler, level)));
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Выполняет команду и всегда возвращает ответ с тем же `request_id`.
    pub async fn dispatch(
        &self,
        session: &Session,
        command: &Command,
    ) -> Response {
        let started = Instant::now();
        let result = match self.handlers.get(&command.command_id) {
            Some(handler) => {
                handler
                    .handle(Request {
                        command,
                        session,
                        services: &self.services,
                    })
                    .await
            }
            None => Err(CommandError::NotFound {
                id: command.command_id,
            }
            .into()),
        };

        match result {
            Ok(reply) => {
                trace!(
                    command_id = command.command_id,
                    request_id = command.request_id,
                    status = %reply.status,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "command handled"
                );
                Response::new(command.request_id, reply.status, reply.body)
            }
            Err(err) => {
                log_failure(session, command, &err);
                Response::error(command.request_id, err.status_code(), err.client_message())
            }
        }
    }
}

fn log_failure(
    session: &Session,
    command: &Command,
    err: &StackError,
) {
    let name = CommandId::from_u16(command.command_id)
        .map(CommandId::name)
        .unwrap_or("unknown");
    let principal = session.principal_id().unwrap_or_default();
    macro_rules! emit {
        ($lvl:ident) => {
            $lvl!(
                connection_id = session.connection_id(),
                command_id = command.command_id,
                command = name,
                db = %command.database,
                collection = %command.collection,
                principal = %principal,
                status = %err.status_code(),
                error = %err,
                "command failed"
            )
        };
    }
    match err.log_level() {
        LogLevel::Trace => emit!(trace),
        LogLevel::Debug => emit!(debug),
        LogLevel::Info => emit!(info),
        LogLevel::Warn => emit!(warn),
        LogLevel::Error => emit!(error),
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
