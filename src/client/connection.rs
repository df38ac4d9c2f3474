use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use spacestore_error::{ClientError, WireError};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, trace, warn};

use crate::protocol::{
    read_frame_into, Command, Delivery, Message, MessageKind, Response, DELIVERY_REQUEST_ID,
};

type Pending = Arc<Mutex<HashMap<u32, oneshot::Sender<Response>>>>;

/// Клиентское соединение с сервером SpaceStore.
///
/// Запросы можно отправлять конкурентно: каждому присваивается свой
/// `request_id`, фоновая задача чтения сопоставляет ответы по нему.
/// Рассылки брокера (`request_id = 0`) уходят в отдельный канал.
pub struct ClientConnection {
    addr: SocketAddr,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU32,
    closed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    request_timeout: Duration,
    write_timeout: Duration,
}

/// Таймауты и буферы соединения.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub write_timeout: Duration,
    /// Сколько рассылок держать до чтения, лишние отбрасываются
    pub delivery_buffer: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ClientConnection {
    /// Подключается к серверу и запускает задачу чтения.
    pub async fn connect(
        addr: SocketAddr,
        options: &ConnectionOptions,
    ) -> Result<(Self, mpsc::Receiver<Delivery>), ClientError> {
        debug!(%addr, "connecting");
        let stream = timeout(options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectionTimeout)?
            .map_err(|e| ClientError::ConnectionFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;
        // без Nagle запросы уходят сразу
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (deliveries_tx, deliveries_rx) = mpsc::channel(options.delivery_buffer.max(1));

        let reader_task = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            deliveries_tx,
            closed.clone(),
        ));
        debug!(%addr, "connected");

        let conn = Self {
            addr,
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_id: AtomicU32::new(1),
            closed,
            reader_task,
            request_timeout: options.request_timeout,
            write_timeout: options.write_timeout,
        };
        Ok((conn, deliveries_rx))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Отправляет команду и ждёт ответ с тем же `request_id`.
    ///
    /// `request_id` команды перезаписывается.
    pub async fn request(
        &self,
        mut command: Command,
    ) -> Result<Response, ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        let request_id = {
            let mut pending = self.pending.lock();
            let id = self.next_request_id(&pending);
            pending.insert(id, tx);
            id
        };
        command.request_id = request_id;

        let mut frame = Vec::with_capacity(command.encoded_len() + 12);
        if let Err(e) = command.encode_frame(&mut frame) {
            self.pending.lock().remove(&request_id);
            return Err(e.into());
        }

        trace!(request_id, command_id = command.command_id, "sending command");
        if let Err(e) = self.write(&frame).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(ClientError::RequestTimeout { request_id })
            }
        }
    }

    /// Закрывает пишущую половину; сервер увидит EOF.
    pub async fn close(&self) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(WireError::from)?;
        Ok(())
    }

    async fn write(
        &self,
        frame: &[u8],
    ) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        timeout(self.write_timeout, writer.write_all(frame))
            .await
            .map_err(|_| ClientError::ConnectionTimeout)?
            .map_err(WireError::from)?;
        Ok(())
    }

    /// Следующий свободный идентификатор. 0 зарезервирован под рассылки.
    fn next_request_id(
        &self,
        pending: &HashMap<u32, oneshot::Sender<Response>>,
    ) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != DELIVERY_REQUEST_ID && !pending.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Разбирает входящие кадры до закрытия соединения.
async fn read_loop(
    read_half: OwnedReadHalf,
    pending: Pending,
    deliveries: mpsc::Sender<Delivery>,
    closed: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(read_half);
    let mut frame = Vec::with_capacity(4096);

    loop {
        if let Err(e) = read_frame_into(&mut reader, &mut frame).await {
            if !e.is_eof() {
                debug!(error = %e, "client read failed");
            }
            break;
        }

        let response = match Message::decode(&frame) {
            Ok(m) if m.kind == MessageKind::Response => match Response::decode(m.payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "malformed response payload");
                    continue;
                }
            },
            Ok(m) => {
                warn!(kind = ?m.kind, "unexpected message kind from server");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "malformed envelope from server");
                continue;
            }
        };

        if response.request_id == DELIVERY_REQUEST_ID {
            route_delivery(&response, &deliveries);
            continue;
        }

        let waiter = pending.lock().remove(&response.request_id);
        match waiter {
            Some(tx) => {
                // получатель мог уже уйти по таймауту
                let _ = tx.send(response);
            }
            None => trace!(request_id = response.request_id, "response without waiter"),
        }
    }

    closed.store(true, Ordering::Release);
    pending.lock().clear();
}

fn route_delivery(
    response: &Response,
    deliveries: &mpsc::Sender<Delivery>,
) {
    if !response.is_delivery() {
        warn!(
            status = %response.status,
            message = %response.error_message(),
            "uncorrelated error from server"
        );
        return;
    }
    match Delivery::decode(&response.body) {
        Ok(delivery) => {
            if let Err(mpsc::error::TrySendError::Full(d)) = deliveries.try_send(delivery) {
                warn!(subject = %d.subject, "delivery buffer full, message dropped");
            }
        }
        Err(e) => warn!(error = %e, "malformed delivery"),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ClientConnection
////////////////////////////////////////////////////////////////////////////////

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            delivery_buffer: 1024,
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
