//! Команды key-value коллекций.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use spacestore_error::{CommandError, EngineError, SpaceResult};

use super::{Handler, Reply, Request};
use crate::{
    codec::Value,
    engine::{KvEngine, SetCondition},
    protocol::CommandId,
};

/// Обработчик всех KV-команд; конкретная операция задаётся `op`.
#[derive(Debug, Clone, Copy)]
pub struct KvHandler {
    op: CommandId,
}

/// Команды, которые обслуживает [`KvHandler`].
pub const KV_COMMANDS: &[CommandId] = &[
    CommandId::Set,
    CommandId::SetTtl,
    CommandId::SetMultiple,
    CommandId::SetMultipleTtl,
    CommandId::SetIfExists,
    CommandId::SetIfExistsTtl,
    CommandId::SetIfNotExists,
    CommandId::SetIfNotExistsTtl,
    CommandId::Delete,
    CommandId::DeleteMultiple,
    CommandId::DeleteAll,
    CommandId::Exists,
    CommandId::Get,
    CommandId::GetMultiple,
    CommandId::GetAll,
    CommandId::GetTtl,
    CommandId::GetMultipleTtl,
    CommandId::GetAllTtl,
    CommandId::Keys,
    CommandId::Count,
    CommandId::Size,
];

impl KvHandler {
    pub fn new(op: CommandId) -> Self {
        Self { op }
    }

    fn conditional(
        &self,
        kv: &KvEngine,
        req: Request<'_>,
        condition: SetCondition,
        with_ttl: bool,
    ) -> SpaceResult<Reply> {
        let mut p = req.payload();
        let key = p.key("key")?;
        let (value, size) = p.value()?;
        let expires_at = if with_ttl {
            Some(p.expires_at()?)
        } else {
            None
        };

        if kv.set_sized(key, value, size, expires_at, condition)? {
            return Ok(Reply::empty());
        }
        Err(match condition {
            SetCondition::IfExists => EngineError::KeyNotFound {
                key: key.to_string(),
            },
            _ => EngineError::KeyExists {
                key: key.to_string(),
            },
        }
        .into())
    }
}

fn ttl_map(map: BTreeMap<String, i64>) -> Value {
    Value::Map(map.into_iter().map(|(k, t)| (k, Value::Int64(t))).collect())
}

#[async_trait]
impl Handler for KvHandler {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let engine = req.engine()?;
        let kv = engine.as_kv()?;
        let mut p = req.payload();

        match self.op {
            CommandId::Set => {
                let key = p.key("key")?;
                let (value, size) = p.value()?;
                kv.set_sized(key, value, size, None, SetCondition::Always)?;
                Ok(Reply::empty())
            }
            CommandId::SetTtl => {
                let key = p.key("key")?;
                let (value, size) = p.value()?;
                let expires_at = p.expires_at()?;
                kv.set_sized(key, value, size, Some(expires_at), SetCondition::Always)?;
                Ok(Reply::empty())
            }
            CommandId::SetMultiple => {
                kv.set_multiple(p.value_map("items")?, None)?;
                Ok(Reply::empty())
            }
            CommandId::SetMultipleTtl => {
                let items = p.value_map("items")?;
                let expires_at = p.expires_at()?;
                kv.set_multiple(items, Some(expires_at))?;
                Ok(Reply::empty())
            }
            CommandId::SetIfExists => self.conditional(kv, req, SetCondition::IfExists, false),
            CommandId::SetIfExistsTtl => self.conditional(kv, req, SetCondition::IfExists, true),
            CommandId::SetIfNotExists => {
                self.conditional(kv, req, SetCondition::IfNotExists, false)
            }
            CommandId::SetIfNotExistsTtl => {
                self.conditional(kv, req, SetCondition::IfNotExists, true)
            }
            CommandId::Delete => {
                kv.delete(p.key("key")?);
                Ok(Reply::empty())
            }
            CommandId::DeleteMultiple => {
                kv.delete_multiple(&p.string_list("keys")?);
                Ok(Reply::empty())
            }
            CommandId::DeleteAll => {
                kv.delete_all();
                Ok(Reply::empty())
            }
            CommandId::Exists => Ok(if kv.exists(p.key("key")?) {
                Reply::empty()
            } else {
                Reply::not_found()
            }),
            CommandId::Get => {
                let key = p.key("key")?;
                match kv.get(key) {
                    Some(value) => Reply::value(&value),
                    None => Err(EngineError::KeyNotFound {
                        key: key.to_string(),
                    }
                    .into()),
                }
            }
            CommandId::GetMultiple => {
                let keys = p.string_list("keys")?;
                Reply::value(&Value::Map(kv.get_multiple(&keys)))
            }
            CommandId::GetAll => Reply::value(&Value::Map(kv.get_all())),
            CommandId::GetTtl => Ok(match kv.get_ttl(p.key("key")?) {
                Some(t) => Reply::ok(Bytes::copy_from_slice(&t.to_be_bytes())),
                None => Reply::not_found(),
            }),
            CommandId::GetMultipleTtl => {
                let keys = p.string_list("keys")?;
                Reply::value(&ttl_map(kv.get_multiple_ttl(&keys)))
            }
            CommandId::GetAllTtl => Reply::value(&ttl_map(kv.get_all_ttl())),
            CommandId::Keys => Reply::value(&Value::string_list(kv.keys())),
            CommandId::Count => Reply::value(&Value::Uint32(kv.count())),
            CommandId::Size => Reply::value(&Value::Uint64(kv.size())),
            other => Err(CommandError::NotFound { id: other.id() }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use spacestore_error::StatusCode;

    use super::*;
    use crate::{
        codec::decode,
        command::{
            test_support::{services, session_for, writer},
            Services, Session,
        },
        protocol::{put_short_str, Command},
    };

    struct Fixture {
        services: std::sync::Arc<Services>,
        session: Session,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                services: services().await,
                session: session_for(Some(writer())),
            }
        }

        async fn call(
            &self,
            op: CommandId,
            collection: &str,
            body: Vec<u8>,
        ) -> SpaceResult<Reply> {
            let command = Command::new(1, op)
                .with_target("d", collection)
                .with_body(body);
            KvHandler::new(op)
                .handle(Request {
                    command: &command,
                    session: &self.session,
                    services: &self.services,
                })
                .await
        }
    }

    fn key_value(
        key: &str,
        value: &Value,
        ttl: Option<i64>,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        put_short_str(&mut buf, "key", key).unwrap();
        value.encode_into(&mut buf).unwrap();
        if let Some(t) = ttl {
            buf.put_i64(t);
        }
        buf
    }

    fn key(k: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        put_short_str(&mut buf, "key", k).unwrap();
        buf
    }

    fn now_ns() -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap()
    }

    #[tokio::test]
    async fn test_set_get_exists() {
        let f = Fixture::new().await;
        let value = Value::from("hello");
        f.call(CommandId::Set, "kv", key_value("k", &value, None))
            .await
            .unwrap();

        let reply = f.call(CommandId::Get, "kv", key("k")).await.unwrap();
        assert_eq!(decode(&reply.body).unwrap(), value);

        let reply = f.call(CommandId::Exists, "kv", key("k")).await.unwrap();
        assert_eq!(reply.status, StatusCode::Ok);
        let reply = f.call(CommandId::Exists, "kv", key("x")).await.unwrap();
        assert_eq!(reply.status, StatusCode::NotFound);

        let err = f.call(CommandId::Get, "kv", key("x")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);

        let reply = f.call(CommandId::Size, "kv", vec![]).await.unwrap();
        assert_eq!(
            decode(&reply.body).unwrap(),
            Value::Uint64(value.encoded_size() as u64)
        );
    }

    #[tokio::test]
    async fn test_ttl_commands() {
        let f = Fixture::new().await;
        let err = f
            .call(CommandId::SetTtl, "kv", key_value("k", &Value::Int32(1), Some(1)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadRequest);

        let t = now_ns() + 60_000_000_000;
        f.call(CommandId::SetTtl, "kv", key_value("k", &Value::Int32(1), Some(t)))
            .await
            .unwrap();
        let reply = f.call(CommandId::GetTtl, "kv", key("k")).await.unwrap();
        assert_eq!(reply.body.as_ref(), &t.to_be_bytes());

        f.call(CommandId::Set, "kv", key_value("p", &Value::Int32(2), None))
            .await
            .unwrap();
        let reply = f.call(CommandId::GetTtl, "kv", key("p")).await.unwrap();
        assert_eq!(reply.status, StatusCode::NotFound);

        let reply = f.call(CommandId::GetAllTtl, "kv", vec![]).await.unwrap();
        let map = decode(&reply.body).unwrap();
        assert_eq!(map.as_map().unwrap().get("k"), Some(&Value::Int64(t)));
        assert_eq!(map.as_map().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_statuses() {
        let f = Fixture::new().await;
        let v = Value::Bool(true);
        let err = f
            .call(CommandId::SetIfExists, "kv", key_value("k", &v, None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);

        f.call(CommandId::SetIfNotExists, "kv", key_value("k", &v, None))
            .await
            .unwrap();
        let err = f
            .call(CommandId::SetIfNotExists, "kv", key_value("k", &v, None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn test_bulk_commands() {
        let f = Fixture::new().await;
        let mut items = BTreeMap::new();
        items.insert("a".to_string(), Value::Uint16(1));
        items.insert("b".to_string(), Value::Uint16(2));
        f.call(CommandId::SetMultiple, "kv", Value::Map(items).encode().unwrap().to_vec())
            .await
            .unwrap();

        let keys = Value::string_list(["a", "zz"]).encode().unwrap().to_vec();
        let reply = f.call(CommandId::GetMultiple, "kv", keys.clone()).await.unwrap();
        let got = decode(&reply.body).unwrap();
        assert_eq!(got.as_map().unwrap().len(), 1);

        let reply = f.call(CommandId::Count, "kv", vec![]).await.unwrap();
        assert_eq!(decode(&reply.body).unwrap(), Value::Uint32(2));

        f.call(CommandId::DeleteMultiple, "kv", keys).await.unwrap();
        let reply = f.call(CommandId::Keys, "kv", vec![]).await.unwrap();
        assert_eq!(decode(&reply.body).unwrap(), Value::string_list(["b"]));

        f.call(CommandId::DeleteAll, "kv", vec![]).await.unwrap();
        f.call(CommandId::Delete, "kv", key("b")).await.unwrap();
        let reply = f.call(CommandId::GetAll, "kv", vec![]).await.unwrap();
        assert_eq!(decode(&reply.body).unwrap(), Value::Map(BTreeMap::new()));
    }

    #[tokio::test]
    async fn test_wrong_engine_and_bad_body() {
        let f = Fixture::new().await;
        let err = f.call(CommandId::Get, "events", key("k")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CommandNotAllowed);

        let err = f.call(CommandId::Get, "missing", key("k")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CollectionNotFound);

        let err = f.call(CommandId::Set, "kv", key("k")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadRequest);
    }

    /// Тест проверяет, что значение с лишними байтами в теле списка не
    /// попадает в хранилище и не раздувает его размер.
    #[tokio::test]
    async fn test_padded_container_does_not_inflate_size() {
        let f = Fixture::new().await;
        let mut body = Vec::new();
        put_short_str(&mut body, "key", "k").unwrap();
        // List<Byte> с одним элементом и заявленной длиной тела 6 вместо 2
        body.extend_from_slice(&[13, 2, 0, 1, 0, 0, 0, 6, 2, 7, 0, 0, 0, 0]);
        let err = f.call(CommandId::Set, "kv", body).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadRequest);

        let reply = f.call(CommandId::Size, "kv", vec![]).await.unwrap();
        assert_eq!(decode(&reply.body).unwrap(), Value::Uint64(0));

        let value = Value::List(vec![Value::Byte(7)]);
        f.call(CommandId::Set, "kv", key_value("k", &value, None))
            .await
            .unwrap();
        let reply = f.call(CommandId::Size, "kv", vec![]).await.unwrap();
        assert_eq!(
            decode(&reply.body).unwrap(),
            Value::Uint64(value.encoded_size() as u64)
        );
    }
}
