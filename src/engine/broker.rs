//! Движок брокера: подписки на субъекты, очереди-группы и удаление мёртвых
//! подписчиков.
//!
//! Доставка асинхронная и не более одного раза. `publish` снимает копию
//! списка подписчиков под блокировкой, а рассылку делает уже без неё.
//!
//! Каждое соединение-подписчик получает свою ограниченную очередь. Фоновая
//! задача забирает из неё сообщения пакетами (до `batch_size` штук или по
//! истечении `batch_timeout`) и передаёт их менеджеру соединений в порядке
//! публикации.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use spacestore_error::EngineError;
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{self, error::TrySendError},
        Notify,
    },
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, trace};

/// Разделитель токенов субъекта.
pub const TOKEN_SEPARATOR: char = '.';
/// Совпадает ровно с одним токеном.
pub const SINGLE_WILDCARD: &str = "*";
/// Совпадает с одним и более оставшимися токенами (только последний токен).
pub const TAIL_WILDCARD: &str = ">";

/// Сообщений в одном вызове `send_to_connection`.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Сколько пакет ждёт добора после первого сообщения.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(100);
/// Ёмкость очереди одного подписчика. При переполнении сообщение теряется.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// Связь брокера с менеджером соединений.
///
/// Реализация должна быть неблокирующей: `send_to_connection` кладёт
/// доставки в исходящую очередь по порядку и возвращает, сколько из них
/// принято. Остальные теряются (очередь полна или соединения уже нет).
pub trait ConnectionSink: Send + Sync {
    fn is_connection_healthy(
        &self,
        connection_id: &str,
    ) -> bool;

    fn send_to_connection(
        &self,
        connection_id: &str,
        subject: &str,
        payloads: &[Bytes],
    ) -> usize;
}

/// Параметры доставки подписчикам.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub queue_capacity: usize,
}

/// Подписчик: соединение и (возможно пустая) очередь-группа.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub connection_id: Arc<str>,
    pub queue_group: Arc<str>,
}

/// Снимок счётчиков брокера.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub publish_count: u64,
    pub delivered_count: u64,
    pub dropped_count: u64,
    pub pruned_count: u64,
}

/// Сообщение в очереди подписчика.
struct Pending {
    subject: Arc<str>,
    payload: Bytes,
}

#[derive(Debug, Default)]
struct Counters {
    publish: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    pruned: AtomicU64,
}

struct BrokerState {
    /// Шаблон подписки → подписчики в порядке подписки.
    subscribers: RwLock<HashMap<Arc<str>, Vec<Subscriber>>>,
    /// Число шаблонов с `*` или `>`. Пока ноль, ищем только точное совпадение.
    wildcard_patterns: AtomicUsize,
    /// Очереди подписчиков. Живут до удаления всех подписок соединения.
    outboxes: Mutex<HashMap<Arc<str>, mpsc::Sender<Pending>>>,
    sink: Arc<dyn ConnectionSink>,
    delivery: DeliveryOptions,
    round_robin: AtomicUsize,
    counters: Arc<Counters>,
}

/// Движок одной broker-коллекции.
#[derive(Clone)]
pub struct BrokerEngine {
    state: Arc<BrokerState>,
}

////////////////////////////////////////////////////////////////////////////////
// Разбор субъектов
////////////////////////////////////////////////////////////////////////////////

fn invalid(
    subject: &str,
    reason: &'static str,
) -> EngineError {
    EngineError::InvalidSubject {
        subject: subject.to_string(),
        reason,
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern
        .split(TOKEN_SEPARATOR)
        .any(|t| t == SINGLE_WILDCARD || t == TAIL_WILDCARD)
}

/// Проверяет шаблон подписки.
///
/// Субъект непрозрачен: пустые токены допустимы и совпадают буквально.
/// Единственное правило для шаблона: `>` может стоять только последним.
pub fn validate_pattern(pattern: &str) -> Result<(), EngineError> {
    if pattern.is_empty() {
        return Err(invalid(pattern, "subject is empty"));
    }
    let mut tokens = pattern.split(TOKEN_SEPARATOR).peekable();
    while let Some(token) = tokens.next() {
        if token == TAIL_WILDCARD && tokens.peek().is_some() {
            return Err(invalid(pattern, "`>` must be the last token"));
        }
    }
    Ok(())
}

/// Проверяет субъект публикации: только конкретные токены.
pub fn validate_subject(subject: &str) -> Result<(), EngineError> {
    validate_pattern(subject)?;
    if is_wildcard(subject) {
        return Err(invalid(subject, "wildcards are not allowed in publish"));
    }
    Ok(())
}

/// Совпадает ли конкретный `subject` с шаблоном.
pub fn subject_matches(
    pattern: &str,
    subject: &str,
) -> bool {
    let mut p = pattern.split(TOKEN_SEPARATOR);
    let mut s = subject.split(TOKEN_SEPARATOR);
    loop {
        match (p.next(), s.next()) {
            (Some(TAIL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => {}
            (Some(pt), Some(st)) if pt == st => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl DeliveryOptions {
    /// Без очередей: `publish` сразу отдаёт каждое сообщение в sink.
    pub fn immediate() -> Self {
        Self {
            batch_size: 1,
            batch_timeout: Duration::ZERO,
            queue_capacity: 1,
        }
    }

    fn is_immediate(&self) -> bool {
        self.batch_size <= 1
    }
}

impl Counters {
    fn record(
        &self,
        sent: usize,
        accepted: usize,
    ) {
        let accepted = accepted.min(sent);
        self.delivered.fetch_add(accepted as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add((sent - accepted) as u64, Ordering::Relaxed);
    }
}

impl BrokerEngine {
    pub fn new(
        sink: Arc<dyn ConnectionSink>,
        delivery: DeliveryOptions,
    ) -> Self {
        Self {
            state: Arc::new(BrokerState {
                subscribers: RwLock::new(HashMap::new()),
                wildcard_patterns: AtomicUsize::new(0),
                outboxes: Mutex::new(HashMap::new()),
                sink,
                delivery,
                round_robin: AtomicUsize::new(0),
                counters: Arc::new(Counters::default()),
            }),
        }
    }

    /// Подписка без группы: получает каждое сообщение.
    pub fn subscribe(
        &self,
        subject: &str,
        connection_id: &str,
    ) -> Result<(), EngineError> {
        self.subscribe_queue(subject, "", connection_id)
    }

    /// Подписка в очередь-группу. Повторный вызов ничего не меняет.
    pub fn subscribe_queue(
        &self,
        subject: &str,
        queue_group: &str,
        connection_id: &str,
    ) -> Result<(), EngineError> {
        validate_pattern(subject)?;
        let subscriber = Subscriber {
            connection_id: Arc::from(connection_id),
            queue_group: Arc::from(queue_group),
        };

        let mut subs = self.state.subscribers.write();
        let list = match subs.get_mut(subject) {
            Some(list) => list,
            None => {
                if is_wildcard(subject) {
                    self.state.wildcard_patterns.fetch_add(1, Ordering::Relaxed);
                }
                subs.entry(Arc::from(subject)).or_default()
            }
        };
        if !list.contains(&subscriber) {
            list.push(subscriber);
            debug!(subject, queue_group, connection_id, "broker: subscribed");
        }
        Ok(())
    }

    /// Снимает все подписки соединения на `subject` во всех группах.
    pub fn unsubscribe(
        &self,
        subject: &str,
        connection_id: &str,
    ) {
        let mut subs = self.state.subscribers.write();
        if let Some(list) = subs.get_mut(subject) {
            list.retain(|s| &*s.connection_id != connection_id);
            if list.is_empty() {
                self.drop_pattern(&mut subs, subject);
            }
        }
    }

    fn drop_pattern(
        &self,
        subs: &mut HashMap<Arc<str>, Vec<Subscriber>>,
        pattern: &str,
    ) {
        if subs.remove(pattern).is_some() && is_wildcard(pattern) {
            self.state.wildcard_patterns.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Удаляет все подписки соединения. Возвращает число удалённых записей.
    pub fn remove_subscriber_by_connection(
        &self,
        connection_id: &str,
    ) -> usize {
        self.remove_where(|s| &*s.connection_id == connection_id)
    }

    /// Удаляет подписчиков, чьё соединение больше не живо.
    pub fn prune_unhealthy(&self) -> usize {
        let sink = self.state.sink.clone();
        let removed = self.remove_where(|s| !sink.is_connection_healthy(&s.connection_id));
        self.state
            .counters
            .pruned
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Удаляет подписки по условию на соединение вместе с очередями этих
    /// соединений. Уже поставленные в очередь сообщения ещё доставляются.
    fn remove_where(
        &self,
        mut dead: impl FnMut(&Subscriber) -> bool,
    ) -> usize {
        let mut subs = self.state.subscribers.write();
        let mut removed = 0;
        let mut emptied = Vec::new();
        let mut gone: HashSet<Arc<str>> = HashSet::new();
        for (pattern, list) in subs.iter_mut() {
            let before = list.len();
            list.retain(|s| {
                if dead(s) {
                    gone.insert(s.connection_id.clone());
                    false
                } else {
                    true
                }
            });
            removed += before - list.len();
            if list.is_empty() {
                emptied.push(pattern.clone());
            }
        }
        for pattern in emptied {
            self.drop_pattern(&mut subs, &pattern);
        }
        drop(subs);

        if !gone.is_empty() {
            let mut outboxes = self.state.outboxes.lock();
            for conn in &gone {
                outboxes.remove(conn);
            }
        }
        removed
    }

    /// Подписчики, чьи шаблоны совпадают с `subject`.
    fn snapshot(
        &self,
        subject: &str,
    ) -> Vec<Subscriber> {
        let subs = self.state.subscribers.read();
        if self.state.wildcard_patterns.load(Ordering::Relaxed) == 0 {
            return subs.get(subject).cloned().unwrap_or_default();
        }
        subs.iter()
            .filter(|(pattern, _)| subject_matches(pattern, subject))
            .flat_map(|(_, list)| list.iter().cloned())
            .collect()
    }

    /// Публикует сообщение и возвращает число поставленных в очередь
    /// доставок.
    ///
    /// Каждый подписчик без группы получает сообщение один раз, каждая
    /// очередь-группа ровно одному живому участнику. Соединение, подписанное
    /// несколькими совпадающими шаблонами, получает одну доставку.
    pub fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<usize, EngineError> {
        validate_subject(subject)?;
        self.state.counters.publish.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.snapshot(subject);
        if snapshot.is_empty() {
            trace!(subject, "broker: publish without subscribers");
            return Ok(0);
        }

        let mut broadcast: Vec<Arc<str>> = Vec::new();
        let mut seen: HashSet<Arc<str>> = HashSet::new();
        let mut groups: HashMap<Arc<str>, Vec<Arc<str>>> = HashMap::new();
        for sub in snapshot {
            if sub.queue_group.is_empty() {
                if seen.insert(sub.connection_id.clone()) {
                    broadcast.push(sub.connection_id);
                }
            } else {
                let members = groups.entry(sub.queue_group).or_default();
                if !members.contains(&sub.connection_id) {
                    members.push(sub.connection_id);
                }
            }
        }

        let sink = &self.state.sink;
        let subject: Arc<str> = Arc::from(subject);
        let mut dead: HashSet<Arc<str>> = HashSet::new();
        let mut enqueued = 0;

        for conn in &broadcast {
            if !sink.is_connection_healthy(conn) {
                dead.insert(conn.clone());
                continue;
            }
            enqueued += self.deliver(conn, &subject, &payload);
        }

        for members in groups.values() {
            let start = self.state.round_robin.fetch_add(1, Ordering::Relaxed);
            for offset in 0..members.len() {
                let conn = &members[(start + offset) % members.len()];
                if dead.contains(conn) {
                    continue;
                }
                if !sink.is_connection_healthy(conn) {
                    dead.insert(conn.clone());
                    continue;
                }
                enqueued += self.deliver(conn, &subject, &payload);
                break;
            }
        }

        if !dead.is_empty() {
            let removed = self.remove_where(|s| dead.contains(&s.connection_id));
            self.state
                .counters
                .pruned
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(subject = %subject, removed, "broker: pruned dead subscribers");
        }
        Ok(enqueued)
    }

    /// Ставит сообщение в очередь подписчика. Возвращает 1, если оно
    /// принято, и 0, если потеряно.
    ///
    /// Вне рантайма tokio очередь не создаётся и сообщение уходит в sink
    /// сразу.
    fn deliver(
        &self,
        connection_id: &Arc<str>,
        subject: &Arc<str>,
        payload: &Bytes,
    ) -> usize {
        let runtime = match Handle::try_current() {
            Ok(handle) if !self.state.delivery.is_immediate() => handle,
            _ => return self.send_now(connection_id, subject, payload),
        };

        let pending = Pending {
            subject: subject.clone(),
            payload: payload.clone(),
        };
        match self.outbox(connection_id, &runtime).try_send(pending) {
            Ok(()) => 1,
            Err(TrySendError::Full(_)) => {
                self.state.counters.record(1, 0);
                trace!(connection_id = %connection_id, subject = %subject, "broker: subscriber queue full");
                0
            }
            Err(TrySendError::Closed(_)) => {
                self.state.outboxes.lock().remove(connection_id);
                self.state.counters.record(1, 0);
                0
            }
        }
    }

    fn send_now(
        &self,
        connection_id: &str,
        subject: &str,
        payload: &Bytes,
    ) -> usize {
        let accepted =
            self.state
                .sink
                .send_to_connection(connection_id, subject, std::slice::from_ref(payload));
        self.state.counters.record(1, accepted);
        if accepted == 0 {
            trace!(connection_id, subject, "broker: delivery dropped");
        }
        accepted.min(1)
    }

    /// Очередь подписчика; при первом обращении запускает её задачу.
    fn outbox(
        &self,
        connection_id: &Arc<str>,
        runtime: &Handle,
    ) -> mpsc::Sender<Pending> {
        let mut outboxes = self.state.outboxes.lock();
        if let Some(tx) = outboxes.get(connection_id).filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }
        let options = self.state.delivery;
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        runtime.spawn(run_outbox(
            connection_id.clone(),
            rx,
            self.state.sink.clone(),
            self.state.counters.clone(),
            options,
        ));
        outboxes.insert(connection_id.clone(), tx.clone());
        tx
    }

    /// Идентификаторы соединений, подписанных ровно на шаблон `pattern`.
    pub fn subscriber_ids(
        &self,
        pattern: &str,
    ) -> Vec<String> {
        self.state
            .subscribers
            .read()
            .get(pattern)
            .map(|list| list.iter().map(|s| s.connection_id.to_string()).collect())
            .unwrap_or_default()
    }

    /// Общее число записей подписки.
    pub fn subscription_count(&self) -> usize {
        self.state.subscribers.read().values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> BrokerStats {
        let c = &self.state.counters;
        BrokerStats {
            publish_count: c.publish.load(Ordering::Relaxed),
            delivered_count: c.delivered.load(Ordering::Relaxed),
            dropped_count: c.dropped.load(Ordering::Relaxed),
            pruned_count: c.pruned.load(Ordering::Relaxed),
        }
    }

    /// Периодически удаляет подписчиков с мёртвыми соединениями.
    pub fn spawn_janitor(
        &self,
        interval: Duration,
        shutdown: Arc<Notify>,
    ) -> JoinHandle<()> {
        let weak: Weak<BrokerState> = Arc::downgrade(&self.state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // первый тик срабатывает сразу
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.notified() => break,
                }
                let Some(state) = weak.upgrade() else {
                    break;
                };
                let removed = BrokerEngine { state }.prune_unhealthy();
                if removed > 0 {
                    debug!(removed, "broker: janitor pruned subscribers");
                }
            }
        })
    }
}

/// Задача очереди одного подписчика.
///
/// Держит только sink и счётчики, поэтому завершается, когда брокер
/// закрывает очередь, и перед этим дочитывает её до конца.
async fn run_outbox(
    connection_id: Arc<str>,
    mut rx: mpsc::Receiver<Pending>,
    sink: Arc<dyn ConnectionSink>,
    counters: Arc<Counters>,
    options: DeliveryOptions,
) {
    let mut batch: Vec<Pending> = Vec::with_capacity(options.batch_size);
    while let Some(first) = rx.recv().await {
        batch.push(first);
        let deadline = tokio::time::sleep_until(Instant::now() + options.batch_timeout);
        tokio::pin!(deadline);
        while batch.len() < options.batch_size {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(pending) => batch.push(pending),
                    None => break,
                },
                _ = &mut deadline => break,
            }
        }
        flush_batch(&connection_id, &mut batch, sink.as_ref(), &counters);
    }
    trace!(connection_id = %connection_id, "broker: subscriber queue closed");
}

/// Отдаёт пакет в sink. Подряд идущие сообщения одного субъекта уходят
/// одним вызовом, порядок сохраняется.
fn flush_batch(
    connection_id: &str,
    batch: &mut Vec<Pending>,
    sink: &dyn ConnectionSink,
    counters: &Counters,
) {
    let mut payloads = Vec::with_capacity(batch.len());
    let mut drained = batch.drain(..).peekable();
    while let Some(first) = drained.next() {
        payloads.clear();
        payloads.push(first.payload);
        while let Some(next) = drained.next_if(|p| p.subject == first.subject) {
            payloads.push(next.payload);
        }
        let accepted = sink.send_to_connection(connection_id, &first.subject, &payloads);
        counters.record(payloads.len(), accepted);
        if accepted < payloads.len() {
            trace!(
                connection_id,
                subject = %first.subject,
                lost = payloads.len() - accepted,
                "broker: deliveries dropped"
            );
        }
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            queue_capacity: SUBSCRIBER_QUEUE_CAPACITY,
        }
    }
}

impl std::fmt::Debug for BrokerEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BrokerEngine")
            .field("subscriptions", &self.subscription_count())
            .field("stats", &self.stats())
            .field("delivery", &self.state.delivery)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use dashmap::{DashMap, DashSet};

    use super::*;

    /// Подставной менеджер соединений: запоминает доставки и размеры
    /// пакетов.
    #[derive(Default)]
    struct RecordingSink {
        dead: DashSet<String>,
        full: DashSet<String>,
        delivered: DashMap<String, Vec<(String, Bytes)>>,
        batches: DashMap<String, Vec<(String, usize)>>,
    }

    impl RecordingSink {
        fn count(
            &self,
            conn: &str,
        ) -> usize {
            self.delivered.get(conn).map(|v| v.len()).unwrap_or(0)
        }

        fn total(&self) -> usize {
            self.delivered.iter().map(|e| e.value().len()).sum()
        }
    }

    impl ConnectionSink for RecordingSink {
        fn is_connection_healthy(
            &self,
            connection_id: &str,
        ) -> bool {
            !self.dead.contains(connection_id)
        }

        fn send_to_connection(
            &self,
            connection_id: &str,
            subject: &str,
            payloads: &[Bytes],
        ) -> usize {
            if self.full.contains(connection_id) {
                return 0;
            }
            self.batches
                .entry(connection_id.to_string())
                .or_default()
                .push((subject.to_string(), payloads.len()));
            let mut delivered = self.delivered.entry(connection_id.to_string()).or_default();
            for payload in payloads {
                delivered.push((subject.to_string(), payload.clone()));
            }
            payloads.len()
        }
    }

    fn broker() -> (BrokerEngine, Arc<RecordingSink>) {
        broker_with(DeliveryOptions::immediate())
    }

    fn broker_with(delivery: DeliveryOptions) -> (BrokerEngine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (BrokerEngine::new(sink.clone(), delivery), sink)
    }

    fn batched(
        batch_size: usize,
        queue_capacity: usize,
    ) -> DeliveryOptions {
        DeliveryOptions {
            batch_size,
            batch_timeout: Duration::from_millis(100),
            queue_capacity,
        }
    }

    #[test]
    fn test_broadcast_to_every_subscriber() {
        let (b, sink) = broker();
        for conn in ["a", "b", "c"] {
            b.subscribe("news", conn).unwrap();
        }
        let n = b.publish("news", Bytes::from_static(b"hi")).unwrap();
        assert_eq!(n, 3);
        for conn in ["a", "b", "c"] {
            assert_eq!(sink.count(conn), 1);
        }
        let got = sink.delivered.get("a").unwrap();
        assert_eq!(got[0], ("news".to_string(), Bytes::from_static(b"hi")));
    }

    #[test]
    fn test_queue_group_delivers_once_per_publish() {
        let (b, sink) = broker();
        b.subscribe_queue("orders", "workers", "A").unwrap();
        b.subscribe_queue("orders", "workers", "B").unwrap();

        for _ in 0..2 {
            assert_eq!(b.publish("orders", Bytes::from_static(&[1])).unwrap(), 1);
        }
        assert_eq!(sink.total(), 2);
        // round robin
        assert_eq!(sink.count("A"), 1);
        assert_eq!(sink.count("B"), 1);
    }

    #[test]
    fn test_queue_group_k_publishes() {
        let (b, sink) = broker();
        for i in 0..5 {
            b.subscribe_queue("jobs", "g", &format!("c{i}")).unwrap();
        }
        b.subscribe("jobs", "watcher").unwrap();
        for _ in 0..17 {
            b.publish("jobs", Bytes::new()).unwrap();
        }
        assert_eq!(sink.count("watcher"), 17);
        assert_eq!(sink.total() - 17, 17);
    }

    /// Тест проверяет удаление подписчика с мёртвым соединением при
    /// публикации.
    #[test]
    fn test_dead_subscriber_pruned_on_publish() {
        let (b, sink) = broker();
        b.subscribe("x", "A").unwrap();
        b.subscribe("x", "B").unwrap();
        sink.dead.insert("A".to_string());

        assert_eq!(b.publish("x", Bytes::from_static(b"m")).unwrap(), 1);
        assert_eq!(sink.count("A"), 0);
        assert_eq!(b.subscriber_ids("x"), vec!["B".to_string()]);
        assert_eq!(b.stats().pruned_count, 1);
    }

    #[test]
    fn test_queue_skips_dead_member() {
        let (b, sink) = broker();
        b.subscribe_queue("q", "g", "A").unwrap();
        b.subscribe_queue("q", "g", "B").unwrap();
        sink.dead.insert("A".to_string());
        for _ in 0..4 {
            assert_eq!(b.publish("q", Bytes::new()).unwrap(), 1);
        }
        assert_eq!(sink.count("B"), 4);
        assert_eq!(b.subscriber_ids("q"), vec!["B".to_string()]);
    }

    #[test]
    fn test_full_queue_drops_silently() {
        let (b, sink) = broker();
        b.subscribe("s", "slow").unwrap();
        b.subscribe("s", "fast").unwrap();
        sink.full.insert("slow".to_string());

        assert_eq!(b.publish("s", Bytes::new()).unwrap(), 1);
        assert_eq!(sink.count("fast"), 1);
        // медленный подписчик не удаляется
        assert_eq!(b.subscriber_ids("s").len(), 2);
        assert_eq!(b.stats().dropped_count, 1);
    }

    #[test]
    fn test_subscribe_idempotent_and_unsubscribe() {
        let (b, sink) = broker();
        b.subscribe("s", "A").unwrap();
        b.subscribe("s", "A").unwrap();
        b.subscribe_queue("s", "g", "A").unwrap();
        assert_eq!(b.subscription_count(), 2);

        b.unsubscribe("s", "A");
        b.unsubscribe("s", "A");
        assert_eq!(b.subscription_count(), 0);
        assert_eq!(b.publish("s", Bytes::new()).unwrap(), 0);
        assert_eq!(sink.total(), 0);
    }

    #[test]
    fn test_remove_by_connection() {
        let (b, _) = broker();
        b.subscribe("a", "X").unwrap();
        b.subscribe("b.*", "X").unwrap();
        b.subscribe("a", "Y").unwrap();
        assert_eq!(b.remove_subscriber_by_connection("X"), 2);
        assert_eq!(b.subscriber_ids("a"), vec!["Y".to_string()]);
        assert!(b.subscriber_ids("b.*").is_empty());
    }

    #[test]
    fn test_wildcards() {
        assert!(subject_matches("a.*.c", "a.b.c"));
        assert!(!subject_matches("a.*.c", "a.b.d"));
        assert!(!subject_matches("a.*", "a.b.c"));
        assert!(subject_matches("a.>", "a.b.c"));
        assert!(!subject_matches("a.>", "a"));
        assert!(subject_matches("a.b", "a.b"));

        let (b, sink) = broker();
        b.subscribe("orders.*", "A").unwrap();
        b.subscribe("orders.>", "A").unwrap();
        b.subscribe("orders.eu", "B").unwrap();
        assert_eq!(b.publish("orders.eu", Bytes::new()).unwrap(), 2);
        assert_eq!(sink.count("A"), 1);
        assert_eq!(sink.count("B"), 1);
    }

    #[test]
    fn test_invalid_subjects() {
        let (b, _) = broker();
        assert!(b.subscribe("", "A").is_err());
        assert!(b.subscribe("a.>.b", "A").is_err());
        let err = b.publish("a.*", Bytes::new()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSubject { .. }));
    }

    /// Тест проверяет, что пустые токены допустимы и совпадают буквально.
    #[test]
    fn test_empty_tokens_match_literally() {
        let (b, sink) = broker();
        for subject in ["a..b", "trailing.", ".lead"] {
            b.subscribe(subject, "A").unwrap();
            assert_eq!(b.publish(subject, Bytes::new()).unwrap(), 1);
        }
        assert_eq!(sink.count("A"), 3);

        b.subscribe("x.*.y", "B").unwrap();
        assert_eq!(b.publish("x..y", Bytes::new()).unwrap(), 1);
        assert_eq!(sink.count("B"), 1);
        assert!(!subject_matches("a..b", "a.b"));
        assert!(b.publish("a..*", Bytes::new()).is_err());
    }

    /// Тест проверяет, что сообщения одного подписчика уходят пакетами
    /// не больше `batch_size` и в порядке публикации.
    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_order() {
        let (b, sink) = broker_with(batched(3, 1024));
        b.subscribe("s", "A").unwrap();
        for i in 0..7u8 {
            assert_eq!(b.publish("s", Bytes::from(vec![i])).unwrap(), 1);
        }

        // два полных пакета уходят сразу, остаток ждёт таймаута
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            *sink.batches.get("A").unwrap(),
            vec![("s".to_string(), 3), ("s".to_string(), 3)]
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.batches.get("A").unwrap().len(), 3);
        let order: Vec<u8> = sink
            .delivered
            .get("A")
            .unwrap()
            .iter()
            .map(|(_, p)| p[0])
            .collect();
        assert_eq!(order, (0..7).collect::<Vec<_>>());
        assert_eq!(b.stats().delivered_count, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_split_by_subject() {
        let (b, sink) = broker_with(batched(10, 1024));
        b.subscribe("orders.>", "A").unwrap();
        for subject in ["orders.eu", "orders.eu", "orders.us", "orders.eu"] {
            b.publish(subject, Bytes::new()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            *sink.batches.get("A").unwrap(),
            vec![
                ("orders.eu".to_string(), 2),
                ("orders.us".to_string(), 1),
                ("orders.eu".to_string(), 1),
            ]
        );
    }

    /// Тест проверяет потерю сообщений при переполнении очереди подписчика.
    #[tokio::test(start_paused = true)]
    async fn test_full_subscriber_queue_drops() {
        let (b, sink) = broker_with(batched(10, 2));
        b.subscribe("s", "A").unwrap();
        let accepted: usize = (0..5)
            .map(|_| b.publish("s", Bytes::new()).unwrap())
            .sum();
        assert_eq!(accepted, 2);
        assert_eq!(b.stats().dropped_count, 3);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sink.count("A"), 2);
        assert_eq!(b.stats().delivered_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_connection_closes_queue() {
        let (b, sink) = broker_with(batched(10, 16));
        b.subscribe("s", "A").unwrap();
        b.publish("s", Bytes::new()).unwrap();
        assert_eq!(b.state.outboxes.lock().len(), 1);

        // уже принятое сообщение всё равно доставляется
        b.remove_subscriber_by_connection("A");
        assert!(b.state.outboxes.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sink.count("A"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_prunes() {
        let (b, sink) = broker();
        b.subscribe("s", "A").unwrap();
        sink.dead.insert("A".to_string());

        let shutdown = Arc::new(Notify::new());
        let handle = b.spawn_janitor(Duration::from_secs(60), shutdown.clone());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(b.subscription_count(), 0);

        shutdown.notify_waiters();
        handle.await.unwrap();
    }
}
