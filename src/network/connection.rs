use std::{
    collections::HashMap,
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use spacestore_error::{StatusCode, WireError};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{tcp::OwnedWriteHalf, TcpStream},
    select,
    sync::{mpsc, watch, Notify, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
    time::{timeout, Instant},
};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{
    connection_registry::ConnectionRegistry,
    connection_state::{ConnectionInfo, ConnectionState},
};
use crate::{
    command::Dispatcher,
    protocol::{read_frame_into, recover_request_id, Command, Message, MessageKind, Response},
};

/// Конфигурация для обработки соединений
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Максимальное кол-во одновременных соединений
    pub max_connections: usize,
    /// Максимальное кол-во соединений с одного IP
    pub max_connections_per_ip: usize,
    /// Таймаут простоя соединения (idle timeout)
    pub idle_timeout: Duration,
    /// Таймаут записи одного кадра
    pub write_timeout: Duration,
    /// Ёмкость исходящей очереди кадров
    pub outbound_queue_capacity: usize,
}

/// Менеджер соединений с лимитами и graceful shutdown.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    /// Семафор общего лимита соединений
    connection_semaphore: Arc<Semaphore>,
    /// Счётчик соединений по IP адресам
    ip_connections: Arc<Mutex<HashMap<IpAddr, usize>>>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: watch::Sender<bool>,
}

/// Держит слот IP-лимита, освобождает его при drop.
struct IpSlot {
    ip: IpAddr,
    table: Arc<Mutex<HashMap<IpAddr, usize>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
            ip_connections: Arc::new(Mutex::new(HashMap::new())),
            registry,
            dispatcher,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Текущее кол-во активных соединений
    pub fn active_connections(&self) -> usize {
        self.registry.active_count()
    }

    /// Подписка на сигнал остановки. Значение `true` означает остановку.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Инициализация graceful shutdown
    pub fn shutdown(&self) {
        info!("initiating graceful shutdown for connection manager");
        self.shutdown_tx.send_replace(true);
    }

    /// Ждать завершения всех активных соединений
    pub async fn wait_for_shutdown(
        &self,
        timeout_duration: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        while self.active_connections() > 0 {
            if start.elapsed() > timeout_duration {
                warn!(
                    active = self.active_connections(),
                    "shutdown timeout reached with live connections"
                );
                return Err(anyhow!("shutdown timeout exceeded"));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!("all connections closed");
        Ok(())
    }

    /// Обрабатывает новое соединение до его закрытия.
    pub async fn handle_connection(
        &self,
        socket: TcpStream,
        addr: SocketAddr,
    ) -> Result<()> {
        let _permit = self
            .try_admit()
            .context("connection limit check failed")?;
        let _ip_slot = self
            .reserve_ip(addr.ip())
            .with_context(|| format!("too many connections from {}", addr.ip()))?;

        let connection_id: Arc<str> = Arc::from(Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity.max(1));
        let info = Arc::new(ConnectionInfo::new(connection_id.clone(), addr, tx));
        self.registry.register(info.clone());
        info!(
            connection_id = %connection_id,
            %addr,
            active = self.active_connections(),
            "connection established"
        );

        let (read_half, write_half) = socket.into_split();
        let closing = Arc::new(Notify::new());
        let writer = tokio::spawn(write_loop(
            write_half,
            rx,
            info.clone(),
            closing.clone(),
            self.config.write_timeout,
        ));

        let result = self.read_loop(&info, BufReader::new(read_half), writer, &closing).await;

        self.teardown(&info);
        match &result {
            Ok(()) => debug!(connection_id = %connection_id, %addr, "connection closed"),
            Err(e) => warn!(connection_id = %connection_id, %addr, error = %e, "connection closed with error"),
        }
        result
    }

    fn try_admit(&self) -> Result<OwnedSemaphorePermit> {
        if self.is_shutting_down() {
            return Err(anyhow!("server is shutting down"));
        }
        self.connection_semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| anyhow!("maximum connections limit reached"))
    }

    fn reserve_ip(
        &self,
        ip: IpAddr,
    ) -> Result<IpSlot> {
        let mut table = self.ip_connections.lock();
        let count = table.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(anyhow!("per-ip limit {} reached", self.config.max_connections_per_ip));
        }
        *count += 1;
        Ok(IpSlot {
            ip,
            table: self.ip_connections.clone(),
        })
    }

    /// Читает кадры, выполняет команды и ставит ответы в исходящую очередь.
    async fn read_loop(
        &self,
        info: &Arc<ConnectionInfo>,
        mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        mut writer: JoinHandle<()>,
        closing: &Notify,
    ) -> Result<()> {
        let connection_id = info.connection_id().to_string();
        let mut shutdown = self.shutdown_receiver();
        let mut frame = Vec::with_capacity(4096);
        let mut out = Vec::with_capacity(4096);
        let mut writer_done = false;
        let mut result = Ok(());

        loop {
            if *shutdown.borrow() {
                debug!(%connection_id, "shutdown signal received");
                break;
            }
            select! {
                _ = shutdown.changed() => {
                    debug!(%connection_id, "shutdown signal received");
                    break;
                }
                _ = &mut writer, if !writer_done => {
                    writer_done = true;
                    debug!(%connection_id, "writer finished, closing connection");
                    break;
                }
                read = timeout(self.config.idle_timeout, read_frame_into(&mut reader, &mut frame)) => {
                    match read {
                        Err(_) => {
                            debug!(%connection_id, "idle timeout");
                            break;
                        }
                        Ok(Err(e)) if e.is_eof() => {
                            debug!(%connection_id, "client closed connection");
                            break;
                        }
                        Ok(Err(e)) => {
                            if !is_recoverable(&e) {
                                result = Err(anyhow!(e).context("fatal read error"));
                            } else {
                                debug!(%connection_id, error = %e, "read error");
                            }
                            break;
                        }
                        Ok(Ok(())) => {
                            info.stats.add_bytes_received(frame.len() as u64 + 4);
                            info.update_activity();

                            let response = self.handle_frame(info, &frame).await;
                            encode_response(&response, &mut out);
                            if !info.enqueue(Bytes::copy_from_slice(&out)).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info.set_state(ConnectionState::Closing);
        info.mark_unhealthy();
        if !writer_done {
            closing.notify_one();
            if let Err(e) = writer.await {
                warn!(%connection_id, error = %e, "writer task failed");
            }
        }
        result
    }

    /// Превращает один кадр в ответ. Ошибки конверта и тела команды
    /// становятся ответом `InvalidMessage`, соединение остаётся открытым.
    async fn handle_frame(
        &self,
        info: &ConnectionInfo,
        frame: &[u8],
    ) -> Response {
        let message = match Message::decode(frame) {
            Ok(m) => m,
            Err(e) => return reject(info, recover_request_id(frame), e),
        };
        if message.kind != MessageKind::Command {
            let e = WireError::UnknownMessageKind {
                found: message.kind.into(),
            };
            return reject(info, recover_request_id(frame), e);
        }
        let command = match Command::decode(message.payload) {
            Ok(c) => c,
            Err(e) => return reject(info, recover_request_id(frame), e),
        };

        info.set_state(ConnectionState::Processing);
        trace!(
            connection_id = info.connection_id(),
            request_id = command.request_id,
            command_id = command.command_id,
            db = %command.database,
            collection = %command.collection,
            "command received"
        );
        let response = self.dispatcher.dispatch(&info.session, &command).await;

        info.stats.increment_commands();
        if !response.is_ok() && response.status != StatusCode::NotFound {
            info.stats.increment_errors();
        }
        info.set_state(if info.session.principal().is_some() {
            ConnectionState::Authenticated
        } else {
            ConnectionState::Idle
        });
        response
    }

    /// Снимает соединение с учёта и чистит его подписки во всех брокерах.
    fn teardown(
        &self,
        info: &ConnectionInfo,
    ) {
        let connection_id = info.connection_id();
        info.mark_unhealthy();
        self.registry.unregister(connection_id);
        let removed = self
            .dispatcher
            .services()
            .engines
            .remove_connection(connection_id);
        if removed > 0 {
            debug!(connection_id, removed, "subscriptions removed");
        }
    }
}

fn reject(
    info: &ConnectionInfo,
    request_id: u32,
    err: WireError,
) -> Response {
    info.stats.increment_errors();
    debug!(
        connection_id = info.connection_id(),
        request_id,
        error = %err,
        "malformed message"
    );
    Response::error(request_id, StatusCode::InvalidMessage, err.to_string())
}

/// Кодирует ответ в `out`. Если ответ не влезает в кадр, вместо него
/// уходит короткая ошибка с тем же `request_id`.
fn encode_response(
    response: &Response,
    out: &mut Vec<u8>,
) {
    if let Err(e) = response.encode_frame(out) {
        warn!(request_id = response.request_id, error = %e, "response not encodable");
        let fallback = Response::error(
            response.request_id,
            StatusCode::InternalServerError,
            "response too large",
        );
        // короткий ответ всегда кодируется
        let _ = fallback.encode_frame(out);
    }
}

/// Разбирает исходящую очередь и пишет кадры в сокет.
///
/// После сигнала `closing` очередь закрывается на приём, уже принятые кадры
/// дописываются.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Bytes>,
    info: Arc<ConnectionInfo>,
    closing: Arc<Notify>,
    write_timeout: Duration,
) {
    loop {
        let frame = select! {
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break,
            },
            _ = closing.notified() => {
                rx.close();
                continue;
            }
        };

        match timeout(write_timeout, writer.write_all(&frame)).await {
            Ok(Ok(())) => {
                info.stats.add_bytes_sent(frame.len() as u64);
                info.update_activity();
            }
            Ok(Err(e)) => {
                debug!(connection_id = info.connection_id(), error = %e, "write failed");
                info.mark_unhealthy();
                break;
            }
            Err(_) => {
                warn!(connection_id = info.connection_id(), "write timeout");
                info.mark_unhealthy();
                break;
            }
        }
    }
    graceful_close_writer(info.connection_id(), writer).await;
}

/// Проверяет, является ли ошибка чтения штатным обрывом соединения
fn is_recoverable(error: &WireError) -> bool {
    match error {
        WireError::Io(e) => matches!(
            e.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut
        ),
        _ => false,
    }
}

async fn graceful_close_writer(
    connection_id: &str,
    mut writer: OwnedWriteHalf,
) {
    if let Err(e) = writer.shutdown().await {
        if e.kind() != ErrorKind::NotConnected {
            debug!(connection_id, error = %e, "error during shutdown");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ConnectionConfig, IpSlot
////////////////////////////////////////////////////////////////////////////////

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_connections_per_ip: 128,
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            outbound_queue_capacity: 1024,
        }
    }
}

impl Drop for IpSlot {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        if let Some(count) = table.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                table.remove(&self.ip);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
