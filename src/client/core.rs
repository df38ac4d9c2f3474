use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use spacestore_error::{ClientError, StatusCode};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{
    collections::{BrokerCollection, KvCollection, ObjectCollection},
    connection::{ClientConnection, ConnectionOptions},
};
use crate::{
    auth::{LOGIN_METHOD_API_KEY, LOGIN_METHOD_PASSWORD},
    catalog::{Collection, Database},
    codec::{decode, unmarshal, FromValue, Value},
    protocol::{put_short_str, Command, CommandId, Delivery},
};

/// Конфигурация клиента.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Таймаут подключения
    pub connect_timeout: Duration,
    /// Сколько ждать ответ на одну команду
    pub request_timeout: Duration,
    /// Таймаут записи кадра
    pub write_timeout: Duration,
    /// Ёмкость очереди рассылок брокера
    pub delivery_buffer: usize,
    /// Имя пользователя для входа при подключении (опционально)
    pub username: Option<String>,
    /// Пароль для входа при подключении (опционально)
    pub password: Option<String>,
    /// Ключ API; используется, если не заданы имя и пароль
    pub api_key: Option<String>,
}

/// Клиент SpaceStore.
///
/// Высокоуровневый интерфейс поверх [`ClientConnection`]: системные
/// команды, чтение каталога и типизированные обёртки над коллекциями.
/// Ответ с неуспешным статусом превращается в [`ClientError::Server`].
pub struct SpaceClient {
    connection: ClientConnection,
    deliveries: Option<mpsc::Receiver<Delivery>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ClientConfig {
    pub fn with_password(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_api_key(
        mut self,
        key: impl Into<String>,
    ) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            write_timeout: self.write_timeout,
            delivery_buffer: self.delivery_buffer,
        }
    }
}

impl SpaceClient {
    /// Подключается к серверу и, если в конфигурации есть учётные данные,
    /// выполняет вход.
    pub async fn connect(
        addr: SocketAddr,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        info!("Подключение к SpaceStore: {addr}");

        let (connection, deliveries) =
            ClientConnection::connect(addr, &config.connection_options()).await?;
        let client = Self {
            connection,
            deliveries: Some(deliveries),
        };

        match (&config.username, &config.password, &config.api_key) {
            (Some(user), Some(pass), _) => client.login_password(user, pass).await?,
            (_, _, Some(key)) => client.login_api_key(key).await?,
            _ => debug!("connected without credentials"),
        }
        Ok(client)
    }

    pub fn connection(&self) -> &ClientConnection {
        &self.connection
    }

    /// Забирает поток рассылок брокера. Возвращает `None` при повторном
    /// вызове.
    pub fn take_deliveries(&mut self) -> Option<mpsc::Receiver<Delivery>> {
        self.deliveries.take()
    }

    /// Отправляет команду и возвращает ответ как есть, с любым статусом.
    pub async fn request(
        &self,
        command: Command,
    ) -> Result<crate::protocol::Response, ClientError> {
        self.connection.request(command).await
    }

    /// Отправляет команду и возвращает тело успешного ответа.
    pub async fn call(
        &self,
        command: Command,
    ) -> Result<Bytes, ClientError> {
        let response = self.connection.request(command).await?;
        if response.is_ok() {
            return Ok(response.body);
        }
        Err(ClientError::Server {
            status: response.status,
            message: response.error_message(),
        })
    }

    /// Как [`SpaceClient::call`], но `NotFound` даёт `Ok(None)`.
    pub(crate) async fn call_optional(
        &self,
        command: Command,
    ) -> Result<Option<Bytes>, ClientError> {
        match self.call(command).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.server_status() == Some(StatusCode::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        let body = self.call(Command::new(0, CommandId::Ping)).await?;
        if body.as_ref() != b"pong" {
            return Err(unexpected(format!("ping answered {body:?}")));
        }
        Ok(())
    }

    pub async fn supported_versions(&self) -> Result<Vec<u8>, ClientError> {
        let body = self
            .call(Command::new(0, CommandId::SupportedProtocolVersions))
            .await?;
        let (count, versions) = body
            .split_first()
            .ok_or_else(|| unexpected("empty version list"))?;
        if versions.len() != *count as usize {
            return Err(unexpected(format!(
                "declared {count} versions, got {}",
                versions.len()
            )));
        }
        Ok(versions.to_vec())
    }

    pub async fn login_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        let mut body = vec![LOGIN_METHOD_PASSWORD];
        put_short_str(&mut body, "username", username)?;
        put_short_str(&mut body, "password", password)?;
        self.call(Command::new(0, CommandId::Login).with_body(body))
            .await?;
        debug!(username, "logged in");
        Ok(())
    }

    pub async fn login_api_key(
        &self,
        key: &str,
    ) -> Result<(), ClientError> {
        let mut body = vec![LOGIN_METHOD_API_KEY];
        put_short_str(&mut body, "api_key", key)?;
        self.call(Command::new(0, CommandId::Login).with_body(body))
            .await?;
        debug!("logged in with api key");
        Ok(())
    }

    /// Есть ли у соединения принципал.
    pub async fn auth_status(&self) -> Result<bool, ClientError> {
        match self.call(Command::new(0, CommandId::AuthStatus)).await {
            Ok(_) => Ok(true),
            Err(e) if e.server_status() == Some(StatusCode::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn database(
        &self,
        name: &str,
    ) -> Result<Database, ClientError> {
        let mut body = Vec::new();
        put_short_str(&mut body, "database", name)?;
        let reply = self
            .call(Command::new(0, CommandId::DatabaseGet).with_body(body))
            .await?;
        binary_record(&reply)
    }

    pub async fn collection(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Collection, ClientError> {
        let mut body = Vec::new();
        put_short_str(&mut body, "database", database)?;
        put_short_str(&mut body, "collection", name)?;
        let reply = self
            .call(Command::new(0, CommandId::CollectionGet).with_body(body))
            .await?;
        binary_record(&reply)
    }

    pub fn kv<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
    ) -> KvCollection<'a> {
        KvCollection::new(self, database, collection)
    }

    pub fn objects<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
    ) -> ObjectCollection<'a> {
        ObjectCollection::new(self, database, collection)
    }

    pub fn broker<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
    ) -> BrokerCollection<'a> {
        BrokerCollection::new(self, database, collection)
    }

    /// Закрывает соединение со стороны клиента.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.connection.close().await
    }
}

pub(crate) fn unexpected(reason: impl Into<String>) -> ClientError {
    ClientError::UnexpectedResponse {
        reason: reason.into(),
    }
}

/// Запись каталога: `Binary` с закодированным словарём внутри.
fn binary_record<T: FromValue>(body: &[u8]) -> Result<T, ClientError> {
    match decode(body)? {
        Value::Binary(inner) => Ok(unmarshal(&inner)?),
        other => Err(unexpected(format!(
            "expected binary record, got {:?}",
            other.kind()
        ))),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ClientConfig {
    fn default() -> Self {
        let options = ConnectionOptions::default();
        Self {
            connect_timeout: options.connect_timeout,
            request_timeout: options.request_timeout,
            write_timeout: options.write_timeout,
            delivery_buffer: options.delivery_buffer,
            username: None,
            password: None,
            api_key: None,
        }
    }
}

impl std::fmt::Debug for SpaceClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SpaceClient")
            .field("connection", &self.connection)
            .field("deliveries_taken", &self.deliveries.is_none())
            .finish()
    }
}
