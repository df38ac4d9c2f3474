use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::connection_state::{ConnectionInfo, ConnectionSnapshot};
use crate::{engine::ConnectionSink, protocol::Response};

/// Реестр живых соединений сервера.
///
/// Он же служит приёмником доставок для broker-движков: по
/// `connection_id` находит исходящую очередь и кладёт в неё готовый кадр.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Arc<str>, Arc<ConnectionInfo>>>,
}

/// Агрегированная статистика по всем соединениям.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalConnectionStats {
    pub active_connections: usize,
    pub total_commands: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub total_dropped_deliveries: u64,
    pub total_errors: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        info: Arc<ConnectionInfo>,
    ) {
        let id: Arc<str> = Arc::from(info.connection_id());
        debug!(connection_id = %id, "connection registered");
        self.connections.write().insert(id, info);
    }

    pub fn unregister(
        &self,
        connection_id: &str,
    ) -> Option<Arc<ConnectionInfo>> {
        let removed = self.connections.write().remove(connection_id);
        if removed.is_some() {
            debug!(connection_id, "connection unregistered");
        }
        removed
    }

    pub fn get(
        &self,
        connection_id: &str,
    ) -> Option<Arc<ConnectionInfo>> {
        self.connections.read().get(connection_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn all_snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .read()
            .values()
            .map(|c| c.snapshot())
            .collect()
    }

    pub fn global_stats(&self) -> GlobalConnectionStats {
        let conns = self.connections.read();
        let mut stats = GlobalConnectionStats {
            active_connections: conns.len(),
            ..Default::default()
        };
        for c in conns.values() {
            stats.total_commands += c.stats.commands();
            stats.total_bytes_sent += c.stats.sent();
            stats.total_bytes_received += c.stats.received();
            stats.total_dropped_deliveries += c.stats.dropped();
            stats.total_errors += c.stats.error_count();
        }
        stats
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ConnectionRegistry
////////////////////////////////////////////////////////////////////////////////

impl ConnectionSink for ConnectionRegistry {
    fn is_connection_healthy(
        &self,
        connection_id: &str,
    ) -> bool {
        self.get(connection_id).is_some_and(|c| c.is_healthy())
    }

    fn send_to_connection(
        &self,
        connection_id: &str,
        subject: &str,
        payloads: &[Bytes],
    ) -> usize {
        let Some(conn) = self.get(connection_id) else {
            return 0;
        };

        let mut accepted = 0;
        for payload in payloads {
            let mut frame = Vec::new();
            let encoded =
                Response::delivery(subject, payload).and_then(|r| r.encode_frame(&mut frame));
            if let Err(err) = encoded {
                warn!(connection_id, subject, error = %err, "delivery not encodable");
                continue;
            }
            if conn.try_enqueue(Bytes::from(frame)) {
                accepted += 1;
            }
        }
        accepted
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
