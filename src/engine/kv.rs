//! Key-value движок с абсолютным TTL и учётом размера.
//!
//! Все записи коллекции лежат под одним `RwLock`. Суммарный размер хранится
//! в атомике и меняется только через `fetch_add`/`fetch_sub`, поэтому
//! читатели видят его без блокировки.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::RwLock;
use spacestore_error::EngineError;
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{debug, trace};

use crate::codec::Value;

/// Источник текущего времени в наносекундах Unix.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Часы по умолчанию: системное время.
pub fn system_clock() -> Clock {
    Arc::new(|| {
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(i64::MAX)
    })
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Момент истечения в наносекундах Unix, `None` если ключ вечный.
    expires_at: Option<i64>,
    /// Закэшированный `encoded_size` значения.
    size: u64,
}

impl Entry {
    fn is_expired(
        &self,
        now: i64,
    ) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Условие для записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    Always,
    IfExists,
    IfNotExists,
}

struct KvState {
    entries: RwLock<HashMap<String, Entry>>,
    size_bytes: AtomicU64,
    /// Число записей с TTL. Если ноль, чистить нечего.
    expiring: AtomicUsize,
    disable_ttl: bool,
    clock: Clock,
}

/// Движок одной KV-коллекции.
#[derive(Clone)]
pub struct KvEngine {
    state: Arc<KvState>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl KvEngine {
    pub fn new(disable_ttl: bool) -> Self {
        Self::with_clock(disable_ttl, system_clock())
    }

    pub fn with_clock(
        disable_ttl: bool,
        clock: Clock,
    ) -> Self {
        Self {
            state: Arc::new(KvState {
                entries: RwLock::new(HashMap::new()),
                size_bytes: AtomicU64::new(0),
                expiring: AtomicUsize::new(0),
                disable_ttl,
                clock,
            }),
        }
    }

    pub fn ttl_disabled(&self) -> bool {
        self.state.disable_ttl
    }

    fn now(&self) -> i64 {
        (self.state.clock)()
    }

    /// Проверяет момент истечения до захвата блокировки.
    fn check_expiry(
        &self,
        expires_at: Option<i64>,
    ) -> Result<(), EngineError> {
        let Some(t) = expires_at else {
            return Ok(());
        };
        if self.state.disable_ttl {
            return Err(EngineError::TtlDisabled);
        }
        if t <= self.now() {
            return Err(EngineError::ExpiryNotInFuture { expires_at: t });
        }
        Ok(())
    }

    /// Вставка под уже взятой блокировкой записи.
    fn put_locked(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: String,
        value: Value,
        size: u64,
        expires_at: Option<i64>,
    ) {
        let new = Entry {
            value,
            expires_at,
            size,
        };
        if new.expires_at.is_some() {
            self.state.expiring.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(old) = entries.insert(key, new) {
            self.forget(&old);
        }
        self.state.size_bytes.fetch_add(size, Ordering::AcqRel);
    }

    /// Учитывает удалённую запись в счётчиках.
    fn forget(
        &self,
        old: &Entry,
    ) {
        self.state.size_bytes.fetch_sub(old.size, Ordering::AcqRel);
        if old.expires_at.is_some() {
            self.state.expiring.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Записывает значение, размер которого уже известен (например, из
    /// декодера).
    pub fn set_sized(
        &self,
        key: impl Into<String>,
        value: Value,
        size: u64,
        expires_at: Option<i64>,
        condition: SetCondition,
    ) -> Result<bool, EngineError> {
        self.check_expiry(expires_at)?;
        let key = key.into();
        let now = self.now();
        let mut entries = self.state.entries.write();

        let live = entries.get(&key).is_some_and(|e| !e.is_expired(now));
        let allowed = match condition {
            SetCondition::Always => true,
            SetCondition::IfExists => live,
            SetCondition::IfNotExists => !live,
        };
        if !allowed {
            return Ok(false);
        }
        self.put_locked(&mut entries, key, value, size, expires_at);
        Ok(true)
    }

    /// `Set`: вечная запись.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: Value,
    ) {
        let size = value.encoded_size() as u64;
        let key = key.into();
        let mut entries = self.state.entries.write();
        self.put_locked(&mut entries, key, value, size, None);
    }

    /// `SetWithTTL`: запись с абсолютным моментом истечения.
    pub fn set_with_ttl(
        &self,
        key: impl Into<String>,
        value: Value,
        expires_at: i64,
    ) -> Result<(), EngineError> {
        let size = value.encoded_size() as u64;
        self.set_sized(key, value, size, Some(expires_at), SetCondition::Always)
            .map(|_| ())
    }

    pub fn set_if_exists(
        &self,
        key: impl Into<String>,
        value: Value,
        expires_at: Option<i64>,
    ) -> Result<bool, EngineError> {
        let size = value.encoded_size() as u64;
        self.set_sized(key, value, size, expires_at, SetCondition::IfExists)
    }

    pub fn set_if_not_exists(
        &self,
        key: impl Into<String>,
        value: Value,
        expires_at: Option<i64>,
    ) -> Result<bool, EngineError> {
        let size = value.encoded_size() as u64;
        self.set_sized(key, value, size, expires_at, SetCondition::IfNotExists)
    }

    /// Записывает несколько пар под одной блокировкой.
    pub fn set_multiple(
        &self,
        items: BTreeMap<String, Value>,
        expires_at: Option<i64>,
    ) -> Result<(), EngineError> {
        self.check_expiry(expires_at)?;
        let mut entries = self.state.entries.write();
        for (key, value) in items {
            let size = value.encoded_size() as u64;
            self.put_locked(&mut entries, key, value, size, expires_at);
        }
        Ok(())
    }

    /// Значение живого ключа. Истёкший ключ удаляется при обращении.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<Value> {
        let now = self.now();
        {
            let entries = self.state.entries.read();
            match entries.get(key) {
                None => return None,
                Some(e) if !e.is_expired(now) => return Some(e.value.clone()),
                Some(_) => {}
            }
        }
        self.evict_if_expired(key, now);
        None
    }

    fn evict_if_expired(
        &self,
        key: &str,
        now: i64,
    ) {
        self.evict_expired(std::iter::once(key), now);
    }

    /// Удаляет из `keys` те записи, что истекли к моменту `now`.
    ///
    /// Срок перепроверяется под блокировкой записи: ключ могли перезаписать
    /// после чтения.
    fn evict_expired<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k str>,
        now: i64,
    ) {
        let mut entries = self.state.entries.write();
        for key in keys {
            if entries.get(key).is_some_and(|e| e.is_expired(now)) {
                if let Some(old) = entries.remove(key) {
                    trace!(key, "kv: expired entry evicted on access");
                    self.forget(&old);
                }
            }
        }
    }

    pub fn exists(
        &self,
        key: &str,
    ) -> bool {
        let now = self.now();
        let expired = {
            let entries = self.state.entries.read();
            match entries.get(key) {
                None => return false,
                Some(e) => e.is_expired(now),
            }
        };
        if expired {
            self.evict_if_expired(key, now);
        }
        !expired
    }

    /// Проходит по `keys` под блокировкой чтения и отдаёт `pick` живые
    /// записи. Истёкшие записи затем удаляются.
    fn scan_keys<T>(
        &self,
        keys: &[String],
        mut pick: impl FnMut(&Entry) -> Option<T>,
    ) -> BTreeMap<String, T> {
        let now = self.now();
        let mut expired = Vec::new();
        let found = {
            let entries = self.state.entries.read();
            keys.iter()
                .filter_map(|k| {
                    let entry = entries.get(k)?;
                    if entry.is_expired(now) {
                        expired.push(k.as_str());
                        return None;
                    }
                    pick(entry).map(|v| (k.clone(), v))
                })
                .collect()
        };
        if !expired.is_empty() {
            self.evict_expired(expired, now);
        }
        found
    }

    /// То же для всех ключей коллекции.
    fn scan_all<T>(
        &self,
        mut pick: impl FnMut(&Entry) -> Option<T>,
    ) -> BTreeMap<String, T> {
        let now = self.now();
        let mut expired = Vec::new();
        let found = {
            let entries = self.state.entries.read();
            entries
                .iter()
                .filter_map(|(k, e)| {
                    if e.is_expired(now) {
                        expired.push(k.clone());
                        return None;
                    }
                    pick(e).map(|v| (k.clone(), v))
                })
                .collect()
        };
        if !expired.is_empty() {
            self.evict_expired(expired.iter().map(String::as_str), now);
        }
        found
    }

    /// Живые значения из `keys`. Отсутствующие ключи пропускаются.
    pub fn get_multiple(
        &self,
        keys: &[String],
    ) -> BTreeMap<String, Value> {
        self.scan_keys(keys, |e| Some(e.value.clone()))
    }

    pub fn get_all(&self) -> BTreeMap<String, Value> {
        self.scan_all(|e| Some(e.value.clone()))
    }

    /// Момент истечения ключа. `None`, если ключа нет или он вечный.
    /// Истёкший ключ удаляется при обращении, как в `get`.
    pub fn get_ttl(
        &self,
        key: &str,
    ) -> Option<i64> {
        let now = self.now();
        {
            let entries = self.state.entries.read();
            match entries.get(key) {
                None => return None,
                Some(e) if !e.is_expired(now) => return e.expires_at,
                Some(_) => {}
            }
        }
        self.evict_if_expired(key, now);
        None
    }

    /// Моменты истечения для `keys`; в результат попадают только ключи с TTL.
    pub fn get_multiple_ttl(
        &self,
        keys: &[String],
    ) -> BTreeMap<String, i64> {
        self.scan_keys(keys, |e| e.expires_at)
    }

    pub fn get_all_ttl(&self) -> BTreeMap<String, i64> {
        self.scan_all(|e| e.expires_at)
    }

    /// Идемпотентное удаление.
    pub fn delete(
        &self,
        key: &str,
    ) {
        let mut entries = self.state.entries.write();
        if let Some(old) = entries.remove(key) {
            self.forget(&old);
        }
    }

    pub fn delete_multiple(
        &self,
        keys: &[String],
    ) {
        let mut entries = self.state.entries.write();
        for key in keys {
            if let Some(old) = entries.remove(key) {
                self.forget(&old);
            }
        }
    }

    pub fn delete_all(&self) {
        let mut entries = self.state.entries.write();
        for (_, old) in entries.drain() {
            self.forget(&old);
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let now = self.now();
        self.state
            .entries
            .read()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Число живых ключей.
    pub fn count(&self) -> u32 {
        self.purge_expired();
        u32::try_from(self.state.entries.read().len()).unwrap_or(u32::MAX)
    }

    /// Суммарный размер живых значений в байтах.
    pub fn size(&self) -> u64 {
        self.purge_expired();
        self.state.size_bytes.load(Ordering::Acquire)
    }

    /// Удаляет все истёкшие записи и возвращает их число.
    pub fn purge_expired(&self) -> usize {
        if self.state.expiring.load(Ordering::Relaxed) == 0 {
            return 0;
        }
        let now = self.now();
        let mut entries = self.state.entries.write();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(old) = entries.remove(key) {
                self.forget(&old);
            }
        }
        expired.len()
    }

    /// Запускает фоновую очистку истёкших ключей.
    ///
    /// Задача держит только `Weak`-ссылку и завершается вместе с движком или
    /// по сигналу `shutdown`. Для коллекций без TTL задача не нужна.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        shutdown: Arc<Notify>,
    ) -> Option<JoinHandle<()>> {
        if self.state.disable_ttl {
            return None;
        }
        let weak: Weak<KvState> = Arc::downgrade(&self.state);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.notified() => break,
                }
                let Some(state) = weak.upgrade() else {
                    break;
                };
                let removed = KvEngine { state }.purge_expired();
                if removed > 0 {
                    debug!(removed, "kv: sweeper removed expired entries");
                }
            }
        }))
    }
}

impl std::fmt::Debug for KvEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("KvEngine")
            .field("disable_ttl", &self.state.disable_ttl)
            .field("size_bytes", &self.state.size_bytes.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;

    use super::*;

    struct ManualClock(Arc<AtomicI64>);

    impl ManualClock {
        fn new(start: i64) -> (Self, Clock) {
            let t = Arc::new(AtomicI64::new(start));
            let read = t.clone();
            (Self(t), Arc::new(move || read.load(Ordering::SeqCst)))
        }

        fn advance(
            &self,
            ns: i64,
        ) {
            self.0.fetch_add(ns, Ordering::SeqCst);
        }
    }

    fn engine() -> (KvEngine, ManualClock) {
        let (clock, f) = ManualClock::new(1_000);
        (KvEngine::with_clock(false, f), clock)
    }

    fn expected_size(engine: &KvEngine) -> u64 {
        engine
            .get_all()
            .values()
            .map(|v| v.encoded_size() as u64)
            .sum()
    }

    #[test]
    fn test_set_get_count() {
        let (kv, _) = engine();
        kv.set("k", Value::from("hello"));
        assert_eq!(kv.get("k"), Some(Value::from("hello")));
        assert!(kv.exists("k"));
        assert_eq!(kv.count(), 1);

        // перезапись не меняет счётчик
        kv.set("k", Value::Int32(1));
        assert_eq!(kv.count(), 1);
        assert_eq!(kv.size(), Value::Int32(1).encoded_size() as u64);
    }

    /// Тест проверяет отказ для момента истечения в прошлом без изменения
    /// состояния.
    #[test]
    fn test_ttl_in_past_rejected() {
        let (kv, _) = engine();
        kv.set("k", Value::Byte(1));
        let err = kv.set_with_ttl("k", Value::Byte(2), 1_000).unwrap_err();
        assert_eq!(err, EngineError::ExpiryNotInFuture { expires_at: 1_000 });
        assert_eq!(kv.get("k"), Some(Value::Byte(1)));
        assert_eq!(kv.get_ttl("k"), None);
    }

    #[test]
    fn test_ttl_expiry_and_lazy_eviction() {
        let (kv, clock) = engine();
        kv.set_with_ttl("k", Value::Int32(1), 1_050).unwrap();
        assert_eq!(kv.get_ttl("k"), Some(1_050));

        clock.advance(10);
        assert_eq!(kv.get("k"), Some(Value::Int32(1)));

        clock.advance(100);
        assert_eq!(kv.get("k"), None);
        assert_eq!(kv.state.entries.read().len(), 0);
        assert_eq!(kv.count(), 0);
        assert_eq!(kv.size(), 0);
    }

    #[test]
    fn test_disabled_ttl_rejects() {
        let kv = KvEngine::new(true);
        let err = kv
            .set_with_ttl("k", Value::Empty, i64::MAX)
            .unwrap_err();
        assert_eq!(err, EngineError::TtlDisabled);
        assert_eq!(kv.count(), 0);
    }

    #[test]
    fn test_conditional_sets() {
        let (kv, clock) = engine();
        assert!(!kv.set_if_exists("k", Value::Byte(1), None).unwrap());
        assert!(kv.set_if_not_exists("k", Value::Byte(1), Some(1_010)).unwrap());
        assert!(!kv.set_if_not_exists("k", Value::Byte(2), None).unwrap());
        assert!(kv.set_if_exists("k", Value::Byte(3), Some(1_010)).unwrap());

        // истёкший ключ считается отсутствующим
        clock.advance(20);
        assert!(!kv.set_if_exists("k", Value::Byte(4), None).unwrap());
        assert!(kv.set_if_not_exists("k", Value::Byte(5), None).unwrap());
        assert_eq!(kv.get("k"), Some(Value::Byte(5)));
        assert_eq!(kv.size(), expected_size(&kv));
    }

    #[test]
    fn test_delete_idempotent() {
        let (kv, _) = engine();
        kv.set("a", Value::from("x"));
        kv.set("b", Value::from("y"));
        kv.delete("a");
        kv.delete("a");
        assert_eq!(kv.keys(), vec!["b".to_string()]);

        kv.delete_multiple(&["b".to_string(), "zz".to_string()]);
        assert_eq!(kv.count(), 0);
        assert_eq!(kv.size(), 0);
    }

    #[test]
    fn test_multi_getters() {
        let (kv, _) = engine();
        let mut items = BTreeMap::new();
        items.insert("a".to_string(), Value::Uint16(1));
        items.insert("b".to_string(), Value::Uint16(2));
        kv.set_multiple(items.clone(), None).unwrap();
        kv.set_with_ttl("c", Value::Uint16(3), 5_000).unwrap();

        let got = kv.get_multiple(&["a".into(), "missing".into()]);
        assert_eq!(got.len(), 1);
        assert_eq!(got.get("a"), Some(&Value::Uint16(1)));

        assert_eq!(kv.get_all().len(), 3);
        assert_eq!(
            kv.get_multiple_ttl(&["a".into(), "c".into()]),
            BTreeMap::from([("c".to_string(), 5_000)])
        );
        assert_eq!(kv.get_all_ttl(), BTreeMap::from([("c".to_string(), 5_000)]));

        kv.delete_all();
        assert!(kv.get_all().is_empty());
        assert_eq!(kv.size(), 0);
    }

    /// Тест проверяет, что чтение TTL удаляет истёкшие записи так же, как
    /// `get`.
    #[test]
    fn test_ttl_getters_evict_expired() {
        let (kv, clock) = engine();
        kv.set_with_ttl("a", Value::Int32(1), 1_050).unwrap();
        kv.set_with_ttl("b", Value::Int32(2), 1_050).unwrap();
        kv.set_with_ttl("c", Value::Int32(3), 1_050).unwrap();
        kv.set("d", Value::Int32(4));
        clock.advance(100);

        assert_eq!(kv.get_ttl("a"), None);
        assert_eq!(kv.state.entries.read().len(), 3);

        assert!(kv.get_multiple_ttl(&["b".into(), "d".into()]).is_empty());
        assert_eq!(kv.state.entries.read().len(), 2);

        assert!(kv.get_all_ttl().is_empty());
        assert_eq!(kv.state.entries.read().len(), 1);
        assert_eq!(kv.state.expiring.load(Ordering::Relaxed), 0);
        assert_eq!(
            kv.state.size_bytes.load(Ordering::Acquire),
            Value::Int32(4).encoded_size() as u64
        );
    }

    /// Тест проверяет, что размер совпадает с суммой размеров живых значений
    /// после смешанной последовательности операций.
    #[test]
    fn test_size_tracks_live_entries() {
        let (kv, clock) = engine();
        kv.set("a", Value::from("aaaa"));
        kv.set_with_ttl("b", Value::List(vec![Value::Byte(1); 10]), 1_100)
            .unwrap();
        kv.set("c", Value::Float64(1.5));
        assert_eq!(kv.size(), expected_size(&kv));

        kv.set("a", Value::Empty);
        assert_eq!(kv.size(), expected_size(&kv));

        clock.advance(200);
        assert_eq!(kv.size(), expected_size(&kv));
        assert_eq!(kv.count(), 2);
    }

    #[test]
    fn test_concurrent_writers_keep_size_consistent() {
        let kv = KvEngine::new(false);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let kv = kv.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", i % 50);
                        if (i + t) % 3 == 0 {
                            kv.delete(&key);
                        } else {
                            kv.set(key, Value::from("x".repeat(i % 7)));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(kv.size(), expected_size(&kv));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired() {
        let (kv, clock) = engine();
        kv.set_with_ttl("k", Value::Byte(1), 1_500).unwrap();
        let shutdown = Arc::new(Notify::new());
        let handle = kv
            .spawn_sweeper(Duration::from_millis(100), shutdown.clone())
            .unwrap();

        clock.advance(1_000);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(kv.state.entries.read().len(), 0);

        shutdown.notify_waiters();
        handle.await.unwrap();
    }

    #[test]
    fn test_no_sweeper_when_ttl_disabled() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let kv = KvEngine::new(true);
            assert!(kv
                .spawn_sweeper(Duration::from_secs(1), Arc::new(Notify::new()))
                .is_none());
        });
    }
}
