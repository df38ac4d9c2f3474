//! Типизированные обёртки над коллекциями: key-value, объекты и брокер.

use std::{collections::BTreeMap, time::Duration};

use bytes::{BufMut, Bytes};
use chrono::Utc;
use spacestore_error::{ClientError, StatusCode};

use super::core::{unexpected, SpaceClient};
use crate::{
    codec::{decode, encode_binary_into, unmarshal, Value},
    engine::ObjectMetadata,
    protocol::{put_short_str, Command, CommandId},
};

/// Момент истечения через `ttl` от текущего времени, в наносекундах Unix.
pub fn expires_in(ttl: Duration) -> i64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
    now.saturating_add(ttl)
}

/// Команды key-value коллекции.
#[derive(Debug, Clone, Copy)]
pub struct KvCollection<'a> {
    client: &'a SpaceClient,
    database: &'a str,
    collection: &'a str,
}

/// Команды object-коллекции.
#[derive(Debug, Clone, Copy)]
pub struct ObjectCollection<'a> {
    client: &'a SpaceClient,
    database: &'a str,
    collection: &'a str,
}

/// Команды broker-коллекции. Рассылки приходят в поток
/// [`SpaceClient::take_deliveries`].
#[derive(Debug, Clone, Copy)]
pub struct BrokerCollection<'a> {
    client: &'a SpaceClient,
    database: &'a str,
    collection: &'a str,
}

fn key_body(key: &str) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::with_capacity(2 + key.len());
    put_short_str(&mut body, "key", key)?;
    Ok(body)
}

fn key_value_body(
    key: &str,
    value: &Value,
    expires_at: Option<i64>,
) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::with_capacity(2 + key.len() + value.encoded_size() + 8);
    put_short_str(&mut body, "key", key)?;
    value.encode_into(&mut body)?;
    if let Some(ns) = expires_at {
        body.put_i64(ns);
    }
    Ok(body)
}

fn fixed<const N: usize>(body: &[u8]) -> Result<[u8; N], ClientError> {
    body.try_into()
        .map_err(|_| unexpected(format!("expected {N} bytes, got {}", body.len())))
}

////////////////////////////////////////////////////////////////////////////////
// KvCollection
////////////////////////////////////////////////////////////////////////////////

impl<'a> KvCollection<'a> {
    pub(crate) fn new(
        client: &'a SpaceClient,
        database: &'a str,
        collection: &'a str,
    ) -> Self {
        Self {
            client,
            database,
            collection,
        }
    }

    fn command(
        &self,
        id: CommandId,
        body: impl Into<Bytes>,
    ) -> Command {
        Command::new(0, id)
            .with_target(self.database, self.collection)
            .with_body(body)
    }

    pub async fn set(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<(), ClientError> {
        let body = key_value_body(key, value, None)?;
        self.client.call(self.command(CommandId::Set, body)).await?;
        Ok(())
    }

    /// Запись с моментом истечения `expires_at` (наносекунды Unix).
    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &Value,
        expires_at: i64,
    ) -> Result<(), ClientError> {
        let body = key_value_body(key, value, Some(expires_at))?;
        self.client
            .call(self.command(CommandId::SetTtl, body))
            .await?;
        Ok(())
    }

    pub async fn set_multiple(
        &self,
        items: BTreeMap<String, Value>,
    ) -> Result<(), ClientError> {
        let body = Value::Map(items).encode()?;
        self.client
            .call(self.command(CommandId::SetMultiple, body))
            .await?;
        Ok(())
    }

    pub async fn set_multiple_with_ttl(
        &self,
        items: BTreeMap<String, Value>,
        expires_at: i64,
    ) -> Result<(), ClientError> {
        let mut body = Vec::new();
        Value::Map(items).encode_into(&mut body)?;
        body.put_i64(expires_at);
        self.client
            .call(self.command(CommandId::SetMultipleTtl, body))
            .await?;
        Ok(())
    }

    /// Записывает, только если ключ уже есть. `false`, если ключа нет.
    pub async fn set_if_exists(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<bool, ClientError> {
        self.conditional(CommandId::SetIfExists, key, value, None)
            .await
    }

    pub async fn set_if_exists_with_ttl(
        &self,
        key: &str,
        value: &Value,
        expires_at: i64,
    ) -> Result<bool, ClientError> {
        self.conditional(CommandId::SetIfExistsTtl, key, value, Some(expires_at))
            .await
    }

    /// Записывает, только если ключа нет. `false`, если ключ уже занят.
    pub async fn set_if_not_exists(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<bool, ClientError> {
        self.conditional(CommandId::SetIfNotExists, key, value, None)
            .await
    }

    pub async fn set_if_not_exists_with_ttl(
        &self,
        key: &str,
        value: &Value,
        expires_at: i64,
    ) -> Result<bool, ClientError> {
        self.conditional(CommandId::SetIfNotExistsTtl, key, value, Some(expires_at))
            .await
    }

    async fn conditional(
        &self,
        id: CommandId,
        key: &str,
        value: &Value,
        expires_at: Option<i64>,
    ) -> Result<bool, ClientError> {
        let body = key_value_body(key, value, expires_at)?;
        match self.client.call(self.command(id, body)).await {
            Ok(_) => Ok(true),
            Err(ClientError::Server { status, .. })
                if matches!(id, CommandId::SetIfExists | CommandId::SetIfExistsTtl)
                    && status == StatusCode::NotFound =>
            {
                Ok(false)
            }
            Err(ClientError::Server { status, message })
                if status == StatusCode::BadRequest && message.contains("already exists") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete(
        &self,
        key: &str,
    ) -> Result<(), ClientError> {
        self.client
            .call(self.command(CommandId::Delete, key_body(key)?))
            .await?;
        Ok(())
    }

    pub async fn delete_multiple<I, S>(
        &self,
        keys: I,
    ) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = Value::string_list(keys).encode()?;
        self.client
            .call(self.command(CommandId::DeleteMultiple, body))
            .await?;
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<(), ClientError> {
        self.client
            .call(self.command(CommandId::DeleteAll, Bytes::new()))
            .await?;
        Ok(())
    }

    pub async fn exists(
        &self,
        key: &str,
    ) -> Result<bool, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::Exists, key_body(key)?))
            .await?;
        Ok(reply.is_some())
    }

    /// Значение ключа; `None`, если ключа нет или он истёк.
    pub async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Value>, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::Get, key_body(key)?))
            .await?;
        reply.map(|body| decode(&body).map_err(ClientError::from)).transpose()
    }

    pub async fn get_multiple<I, S>(
        &self,
        keys: I,
    ) -> Result<BTreeMap<String, Value>, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = Value::string_list(keys).encode()?;
        let reply = self
            .client
            .call(self.command(CommandId::GetMultiple, body))
            .await?;
        Ok(unmarshal(&reply)?)
    }

    pub async fn get_all(&self) -> Result<BTreeMap<String, Value>, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::GetAll, Bytes::new()))
            .await?;
        Ok(unmarshal(&reply)?)
    }

    /// Момент истечения ключа в наносекундах Unix. `None`, если ключа нет
    /// или у него нет срока жизни.
    pub async fn get_ttl(
        &self,
        key: &str,
    ) -> Result<Option<i64>, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::GetTtl, key_body(key)?))
            .await?;
        reply
            .map(|body| fixed::<8>(&body).map(i64::from_be_bytes))
            .transpose()
    }

    pub async fn get_multiple_ttl<I, S>(
        &self,
        keys: I,
    ) -> Result<BTreeMap<String, i64>, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = Value::string_list(keys).encode()?;
        let reply = self
            .client
            .call(self.command(CommandId::GetMultipleTtl, body))
            .await?;
        Ok(unmarshal(&reply)?)
    }

    pub async fn get_all_ttl(&self) -> Result<BTreeMap<String, i64>, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::GetAllTtl, Bytes::new()))
            .await?;
        Ok(unmarshal(&reply)?)
    }

    pub async fn keys(&self) -> Result<Vec<String>, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::Keys, Bytes::new()))
            .await?;
        Ok(unmarshal(&reply)?)
    }

    pub async fn count(&self) -> Result<u32, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::Count, Bytes::new()))
            .await?;
        Ok(unmarshal(&reply)?)
    }

    /// Суммарный закодированный размер живых значений.
    pub async fn size(&self) -> Result<u64, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::Size, Bytes::new()))
            .await?;
        Ok(unmarshal(&reply)?)
    }
}

////////////////////////////////////////////////////////////////////////////////
// ObjectCollection
////////////////////////////////////////////////////////////////////////////////

impl<'a> ObjectCollection<'a> {
    pub(crate) fn new(
        client: &'a SpaceClient,
        database: &'a str,
        collection: &'a str,
    ) -> Self {
        Self {
            client,
            database,
            collection,
        }
    }

    fn command(
        &self,
        id: CommandId,
        body: impl Into<Bytes>,
    ) -> Command {
        Command::new(0, id)
            .with_target(self.database, self.collection)
            .with_body(body)
    }

    pub async fn put(
        &self,
        key: &str,
        data: &[u8],
    ) -> Result<(), ClientError> {
        let mut body = key_body(key)?;
        encode_binary_into(data, &mut body)?;
        self.client
            .call(self.command(CommandId::ObjectPut, body))
            .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Bytes>, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::ObjectGet, key_body(key)?))
            .await?;
        reply
            .map(|body| unmarshal::<Bytes>(&body).map_err(ClientError::from))
            .transpose()
    }

    pub async fn metadata(
        &self,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::ObjectGetMetadata, key_body(key)?))
            .await?;
        match reply {
            Some(body) => ObjectMetadata::decode(&body)
                .map(Some)
                .ok_or_else(|| unexpected("truncated object metadata")),
            None => Ok(None),
        }
    }

    /// Удаляет объект. `false`, если его не было.
    pub async fn delete(
        &self,
        key: &str,
    ) -> Result<bool, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::ObjectDelete, key_body(key)?))
            .await?;
        Ok(reply.is_some())
    }

    pub async fn exists(
        &self,
        key: &str,
    ) -> Result<bool, ClientError> {
        let reply = self
            .client
            .call_optional(self.command(CommandId::ObjectExists, key_body(key)?))
            .await?;
        Ok(reply.is_some())
    }

    pub async fn count(&self) -> Result<u32, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::ObjectCount, Bytes::new()))
            .await?;
        Ok(u32::from_be_bytes(fixed::<4>(&reply)?))
    }

    pub async fn size(&self) -> Result<u64, ClientError> {
        let reply = self
            .client
            .call(self.command(CommandId::ObjectSize, Bytes::new()))
            .await?;
        Ok(u64::from_be_bytes(fixed::<8>(&reply)?))
    }
}

////////////////////////////////////////////////////////////////////////////////
// BrokerCollection
////////////////////////////////////////////////////////////////////////////////

impl<'a> BrokerCollection<'a> {
    pub(crate) fn new(
        client: &'a SpaceClient,
        database: &'a str,
        collection: &'a str,
    ) -> Self {
        Self {
            client,
            database,
            collection,
        }
    }

    async fn send(
        &self,
        id: CommandId,
        body: Vec<u8>,
    ) -> Result<(), ClientError> {
        let command = Command::new(0, id)
            .with_target(self.database, self.collection)
            .with_body(body);
        self.client.call(command).await?;
        Ok(())
    }

    /// Подписка на тему; допускаются шаблоны `*` и `>`.
    pub async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<(), ClientError> {
        let mut body = Vec::new();
        put_short_str(&mut body, "subject", subject)?;
        self.send(CommandId::BrokerSubscribe, body).await
    }

    /// Подписка в группе: каждое сообщение получает один участник группы.
    pub async fn subscribe_queue(
        &self,
        subject: &str,
        queue: &str,
    ) -> Result<(), ClientError> {
        let mut body = Vec::new();
        put_short_str(&mut body, "subject", subject)?;
        put_short_str(&mut body, "queue", queue)?;
        self.send(CommandId::BrokerSubscribeQueue, body).await
    }

    pub async fn unsubscribe(
        &self,
        subject: &str,
    ) -> Result<(), ClientError> {
        let mut body = Vec::new();
        put_short_str(&mut body, "subject", subject)?;
        self.send(CommandId::BrokerUnsubscribe, body).await
    }

    pub async fn publish(
        &self,
        subject: &str,
        data: &[u8],
    ) -> Result<(), ClientError> {
        let mut body = Vec::with_capacity(2 + subject.len() + 5 + data.len());
        put_short_str(&mut body, "subject", subject)?;
        encode_binary_into(data, &mut body)?;
        self.send(CommandId::BrokerPublish, body).await
    }
}
