use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use spacestore_error::{CatalogError, EngineError, SpaceResult};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{debug, info};

use super::{
    broker::{DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT, SUBSCRIBER_QUEUE_CAPACITY},
    BrokerEngine, ConnectionSink, DeliveryOptions, KvEngine, ObjectEngine,
};
use crate::catalog::{Catalog, Collection, EngineKind};

/// Экземпляр движка коллекции.
#[derive(Debug, Clone)]
pub enum Engine {
    KeyValue(KvEngine),
    Object(Arc<ObjectEngine>),
    Broker(BrokerEngine),
}

/// Интервалы фоновых задач движков и параметры доставки брокера.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub sweep_interval: Duration,
    pub cleanup_interval: Duration,
    /// Сообщений в одном пакете доставки; 1 отключает очереди подписчиков.
    pub batch_size: usize,
    pub batch_timeout: Duration,
}

type CollectionKey = (String, String);

/// Реестр движков `(database, collection) → Engine`.
///
/// Заполняется при старте из каталога. Брокеры получают `sink`, через
/// который менеджер соединений принимает доставки.
pub struct EngineRegistry {
    engines: RwLock<HashMap<CollectionKey, Engine>>,
    sink: Arc<dyn ConnectionSink>,
    options: EngineOptions,
    shutdown: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Engine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Self::KeyValue(_) => EngineKind::KeyValue,
            Self::Object(_) => EngineKind::Object,
            Self::Broker(_) => EngineKind::Broker,
        }
    }

    fn mismatch(
        &self,
        expected: EngineKind,
    ) -> EngineError {
        EngineError::KindMismatch {
            expected: expected.as_str(),
            actual: self.kind().as_str(),
        }
    }

    pub fn as_kv(&self) -> Result<&KvEngine, EngineError> {
        match self {
            Self::KeyValue(kv) => Ok(kv),
            _ => Err(self.mismatch(EngineKind::KeyValue)),
        }
    }

    pub fn as_object(&self) -> Result<&ObjectEngine, EngineError> {
        match self {
            Self::Object(obj) => Ok(obj),
            _ => Err(self.mismatch(EngineKind::Object)),
        }
    }

    pub fn as_broker(&self) -> Result<&BrokerEngine, EngineError> {
        match self {
            Self::Broker(broker) => Ok(broker),
            _ => Err(self.mismatch(EngineKind::Broker)),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(1000),
            cleanup_interval: Duration::from_secs(60),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

impl EngineOptions {
    pub fn delivery(&self) -> DeliveryOptions {
        DeliveryOptions {
            batch_size: self.batch_size,
            batch_timeout: self.batch_timeout,
            queue_capacity: SUBSCRIBER_QUEUE_CAPACITY,
        }
    }
}

impl EngineRegistry {
    pub fn new(
        sink: Arc<dyn ConnectionSink>,
        options: EngineOptions,
    ) -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            sink,
            options,
            shutdown: Arc::new(Notify::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Создаёт по движку на каждую коллекцию каталога. Возвращает число
    /// созданных движков.
    pub async fn load(
        &self,
        catalog: &dyn Catalog,
    ) -> SpaceResult<usize> {
        let mut created = 0;
        for (database, collections) in catalog.list_all().await? {
            for collection in collections {
                self.create(&collection);
                created += 1;
            }
            debug!(database = %database.name, "registry: database loaded");
        }
        info!(engines = created, "registry: engines materialized");
        Ok(created)
    }

    /// Создаёт движок коллекции и запускает его фоновые задачи.
    ///
    /// Существующий движок с тем же ключом заменяется.
    pub fn create(
        &self,
        collection: &Collection,
    ) -> Engine {
        let engine = match collection.engine {
            EngineKind::KeyValue => {
                let kv = KvEngine::new(collection.ttl_disabled());
                if let Some(task) =
                    kv.spawn_sweeper(self.options.sweep_interval, self.shutdown.clone())
                {
                    self.tasks.lock().push(task);
                }
                Engine::KeyValue(kv)
            }
            EngineKind::Object => Engine::Object(Arc::new(ObjectEngine::new())),
            EngineKind::Broker => {
                let broker = BrokerEngine::new(self.sink.clone(), self.options.delivery());
                let task =
                    broker.spawn_janitor(self.options.cleanup_interval, self.shutdown.clone());
                self.tasks.lock().push(task);
                Engine::Broker(broker)
            }
        };
        debug!(
            db = %collection.database,
            collection = %collection.name,
            engine = %collection.engine,
            "registry: engine created"
        );
        self.engines.write().insert(
            (collection.database.clone(), collection.name.clone()),
            engine.clone(),
        );
        engine
    }

    /// Движок коллекции или `CollectionNotFound`.
    pub fn get(
        &self,
        database: &str,
        collection: &str,
    ) -> SpaceResult<Engine> {
        if database.is_empty() || collection.is_empty() {
            return Err(not_found(database, collection));
        }
        self.engines
            .read()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .ok_or_else(|| not_found(database, collection))
    }

    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn brokers(&self) -> Vec<BrokerEngine> {
        self.engines
            .read()
            .values()
            .filter_map(|e| match e {
                Engine::Broker(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    /// Снимает подписки соединения во всех брокерах.
    pub fn remove_connection(
        &self,
        connection_id: &str,
    ) -> usize {
        let removed: usize = self
            .brokers()
            .iter()
            .map(|b| b.remove_subscriber_by_connection(connection_id))
            .sum();
        if removed > 0 {
            debug!(connection_id, removed, "registry: subscriptions removed");
        }
        removed
    }

    /// Останавливает фоновые задачи движков.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

fn not_found(
    database: &str,
    collection: &str,
) -> spacestore_error::StackError {
    CatalogError::CollectionNotFound {
        database: database.to_string(),
        name: collection.to_string(),
    }
    .into()
}

impl Drop for EngineRegistry {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
