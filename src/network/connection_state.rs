use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::command::Session;

/// Состояние соединения в его жизненном цикле.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Новое соединение, принципала ещё нет
    New,
    /// Выполнен `Login`
    Authenticated,
    /// Обрабатывает команду
    Processing,
    /// Ожидает команду
    Idle,
    /// Закрывается
    Closing,
}

/// Метаданные соединения.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetadata {
    pub connection_id: Arc<str>,
    pub client_addr: SocketAddr,
    #[serde(skip)]
    pub connected_at: Instant,
    pub state: ConnectionState,
    #[serde(skip)]
    pub last_activity: Instant,
}

/// Потокобезопасная статистика соединения.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub commands_processed: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub deliveries_dropped: AtomicU64,
    pub errors: AtomicUsize,
}

/// Снимок соединения для мониторинга.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub connection_id: String,
    pub client_addr: String,
    pub state: ConnectionState,
    pub principal: Option<String>,
    pub uptime_secs: u64,
    pub idle_secs: u64,
    pub commands_processed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub deliveries_dropped: u64,
    pub errors: usize,
}

/// Всё, что сервер знает о живом соединении.
///
/// Исходящая очередь принимает уже закодированные кадры; писатель
/// соединения разбирает её последовательно.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub metadata: parking_lot::RwLock<ConnectionMetadata>,
    pub stats: ConnectionStats,
    pub session: Arc<Session>,
    healthy: AtomicBool,
    outbound: mpsc::Sender<Bytes>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConnectionMetadata {
    pub fn new(
        connection_id: Arc<str>,
        client_addr: SocketAddr,
    ) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            client_addr,
            connected_at: now,
            state: ConnectionState::New,
            last_activity: now,
        }
    }

    /// Время с момента подключения.
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Время с последнего чтения или записи.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

impl ConnectionStats {
    pub fn increment_commands(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(
        &self,
        bytes: u64,
    ) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_received(
        &self,
        bytes: u64,
    ) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commands(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.deliveries_dropped.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl ConnectionInfo {
    pub fn new(
        connection_id: Arc<str>,
        client_addr: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            metadata: parking_lot::RwLock::new(ConnectionMetadata::new(
                connection_id.clone(),
                client_addr,
            )),
            stats: ConnectionStats::default(),
            session: Arc::new(Session::new(connection_id)),
            healthy: AtomicBool::new(true),
            outbound,
        }
    }

    pub fn connection_id(&self) -> &str {
        self.session.connection_id()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Помечает соединение мёртвым. Брокеры перестают ему доставлять.
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
    }

    pub fn update_activity(&self) {
        self.metadata.write().last_activity = Instant::now();
    }

    pub fn set_state(
        &self,
        state: ConnectionState,
    ) {
        self.metadata.write().state = state;
    }

    /// Кладёт кадр в исходящую очередь без ожидания.
    ///
    /// Возвращает `false`, если очередь полна (кадр отброшен) или закрыта
    /// (соединение помечается мёртвым).
    pub fn try_enqueue(
        &self,
        frame: Bytes,
    ) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.increment_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_unhealthy();
                false
            }
        }
    }

    /// Кладёт кадр в очередь, дожидаясь места. `false`, если писатель уже
    /// завершился.
    pub async fn enqueue(
        &self,
        frame: Bytes,
    ) -> bool {
        if self.outbound.send(frame).await.is_err() {
            self.mark_unhealthy();
            return false;
        }
        true
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let meta = self.metadata.read();
        ConnectionSnapshot {
            connection_id: meta.connection_id.to_string(),
            client_addr: meta.client_addr.to_string(),
            state: meta.state,
            principal: self.session.principal_id(),
            uptime_secs: meta.uptime().as_secs(),
            idle_secs: meta.idle_time().as_secs(),
            commands_processed: self.stats.commands(),
            bytes_sent: self.stats.sent(),
            bytes_received: self.stats.received(),
            deliveries_dropped: self.stats.dropped(),
            errors: self.stats.error_count(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
