use async_trait::async_trait;
use spacestore_error::{CommandError, SpaceResult};
use tracing::trace;

use super::{Handler, Reply, Request};
use crate::protocol::CommandId;

/// Команды broker-коллекций. Подписчиком выступает соединение, с которого
/// пришла команда.
#[derive(Debug, Clone, Copy)]
pub struct BrokerHandler {
    op: CommandId,
}

pub const BROKER_COMMANDS: &[CommandId] = &[
    CommandId::BrokerSubscribe,
    CommandId::BrokerSubscribeQueue,
    CommandId::BrokerUnsubscribe,
    CommandId::BrokerPublish,
];

impl BrokerHandler {
    pub fn new(op: CommandId) -> Self {
        Self { op }
    }
}

#[async_trait]
impl Handler for BrokerHandler {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let engine = req.engine()?;
        let broker = engine.as_broker()?;
        let connection_id = req.session.connection_id();
        let mut p = req.payload();

        match self.op {
            CommandId::BrokerSubscribe => {
                broker.subscribe(p.key("subject")?, connection_id)?;
            }
            CommandId::BrokerSubscribeQueue => {
                let subject = p.key("subject")?;
                let group = p.key("queue")?;
                broker.subscribe_queue(subject, group, connection_id)?;
            }
            CommandId::BrokerUnsubscribe => {
                broker.unsubscribe(p.key("subject")?, connection_id);
            }
            CommandId::BrokerPublish => {
                let subject = p.key("subject")?;
                let data = p.binary("data")?;
                let enqueued = broker.publish(subject, data)?;
                trace!(subject, enqueued, "publish handled");
            }
            other => return Err(CommandError::NotFound { id: other.id() }.into()),
        }
        Ok(Reply::empty())
    }
}
