use async_trait::async_trait;
use bytes::Bytes;
use spacestore_error::{CommandError, EngineError, SpaceResult};

use super::{Handler, Reply, Request};
use crate::{
    codec::Value,
    engine::ObjectMetadata,
    protocol::CommandId,
};

/// Команды object-коллекций.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHandler {
    op: CommandId,
}

pub const OBJECT_COMMANDS: &[CommandId] = &[
    CommandId::ObjectPut,
    CommandId::ObjectGet,
    CommandId::ObjectGetMetadata,
    CommandId::ObjectDelete,
    CommandId::ObjectExists,
    CommandId::ObjectCount,
    CommandId::ObjectSize,
];

impl ObjectHandler {
    pub fn new(op: CommandId) -> Self {
        Self { op }
    }
}

fn missing(key: &str) -> spacestore_error::StackError {
    EngineError::KeyNotFound {
        key: key.to_string(),
    }
    .into()
}

#[async_trait]
impl Handler for ObjectHandler {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let engine = req.engine()?;
        let objects = engine.as_object()?;
        let mut p = req.payload();

        match self.op {
            CommandId::ObjectPut => {
                let key = p.key("key")?;
                let data = p.binary("data")?;
                objects.put(key, data);
                Ok(Reply::empty())
            }
            CommandId::ObjectGet => {
                let key = p.key("key")?;
                let data = objects.get(key).ok_or_else(|| missing(key))?;
                Reply::value(&Value::Binary(data))
            }
            CommandId::ObjectGetMetadata => {
                let key = p.key("key")?;
                let meta = objects.metadata(key).ok_or_else(|| missing(key))?;
                let mut body = Vec::with_capacity(ObjectMetadata::ENCODED_LEN);
                meta.encode_into(&mut body);
                Ok(Reply::ok(body))
            }
            CommandId::ObjectDelete => {
                let key = p.key("key")?;
                if objects.delete(key) {
                    Ok(Reply::empty())
                } else {
                    Err(missing(key))
                }
            }
            CommandId::ObjectExists => Ok(if objects.exists(p.key("key")?) {
                Reply::empty()
            } else {
                Reply::not_found()
            }),
            CommandId::ObjectCount => Ok(Reply::ok(Bytes::copy_from_slice(
                &objects.count().to_be_bytes(),
            ))),
            CommandId::ObjectSize => Ok(Reply::ok(Bytes::copy_from_slice(
                &objects.size().to_be_bytes(),
            ))),
            other => Err(CommandError::NotFound { id: other.id() }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use spacestore_error::StatusCode;

    use super::*;
    use crate::{
        codec::decode,
        command::test_support::{services, session_for, writer},
        protocol::{put_short_str, Command},
    };

    fn key_body(
        key: &str,
        data: Option<&[u8]>,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        put_short_str(&mut buf, "key", key).unwrap();
        if let Some(d) = data {
            Value::Binary(Bytes::copy_from_slice(d))
                .encode_into(&mut buf)
                .unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn test_object_lifecycle() {
        let services = services().await;
        let session = session_for(Some(writer()));
        let call = |op: CommandId, body: Vec<u8>| {
            let services = services.clone();
            let session = &session;
            async move {
                let command = Command::new(1, op).with_target("d", "obj").with_body(body);
                ObjectHandler::new(op)
                    .handle(Request {
                        command: &command,
                        session,
                        services: &services,
                    })
                    .await
            }
        };

        call(CommandId::ObjectPut, key_body("a", Some(b"blob")))
            .await
            .unwrap();
        let reply = call(CommandId::ObjectGet, key_body("a", None)).await.unwrap();
        assert_eq!(
            decode(&reply.body).unwrap(),
            Value::Binary(Bytes::from_static(b"blob"))
        );

        let reply = call(CommandId::ObjectGetMetadata, key_body("a", None))
            .await
            .unwrap();
        let meta = ObjectMetadata::decode(&reply.body).unwrap();
        assert_eq!(meta.size, 4);
        assert_eq!(meta.crc32, crc32fast::hash(b"blob"));

        let reply = call(CommandId::ObjectCount, vec![]).await.unwrap();
        assert_eq!(reply.body.as_ref(), &1u32.to_be_bytes());
        let reply = call(CommandId::ObjectSize, vec![]).await.unwrap();
        assert_eq!(reply.body.as_ref(), &4u64.to_be_bytes());

        call(CommandId::ObjectDelete, key_body("a", None))
            .await
            .unwrap();
        let err = call(CommandId::ObjectDelete, key_body("a", None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);
        let reply = call(CommandId::ObjectExists, key_body("a", None))
            .await
            .unwrap();
        assert_eq!(reply.status, StatusCode::NotFound);
    }
}
