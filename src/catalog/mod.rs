//! Каталог баз данных и коллекций.
//!
//! Ядро только читает каталог: хранение и изменение записей находятся вне
//! сервера. [`InMemoryCatalog`] используется как встроенная реализация и в
//! тестах.

pub mod model;

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use spacestore_error::{CatalogError, SpaceResult};
use tracing::debug;

pub use model::{Collection, Database, EngineKind, KvSettings, PermissionLevel};

/// Имя встроенной базы данных.
pub const SYSTEM_DATABASE: &str = "system";

/// Доступ к каталогу.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_database(
        &self,
        name: &str,
    ) -> SpaceResult<Database>;

    async fn get_collection(
        &self,
        database: &str,
        name: &str,
    ) -> SpaceResult<Collection>;

    /// Все базы данных вместе с их коллекциями. Вызывается один раз при
    /// старте.
    async fn list_all(&self) -> SpaceResult<Vec<(Database, Vec<Collection>)>>;
}

#[derive(Debug, Clone)]
struct DatabaseEntry {
    database: Database,
    collections: BTreeMap<String, Collection>,
}

/// Каталог в памяти.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    databases: RwLock<BTreeMap<String, DatabaseEntry>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Каталог с базой `system` и тремя тестовыми коллекциями, по одной на
    /// каждый движок.
    pub fn with_system_seed() -> Self {
        let catalog = Self::new();
        catalog.put_database(Database::new(SYSTEM_DATABASE));
        for (name, engine) in [
            ("kv_test", EngineKind::KeyValue),
            ("obj_test", EngineKind::Object),
            ("broker_test", EngineKind::Broker),
        ] {
            // База только что создана, ошибки быть не может.
            let _ = catalog.put_collection(Collection::new(SYSTEM_DATABASE, name, engine));
        }
        catalog
    }

    /// Добавляет или заменяет базу данных. Коллекции сохраняются.
    pub fn put_database(
        &self,
        database: Database,
    ) {
        debug!(database = %database.name, "catalog: database stored");
        let mut dbs = self.databases.write();
        match dbs.get_mut(&database.name) {
            Some(entry) => entry.database = database,
            None => {
                dbs.insert(
                    database.name.clone(),
                    DatabaseEntry {
                        database,
                        collections: BTreeMap::new(),
                    },
                );
            }
        }
    }

    pub fn put_collection(
        &self,
        collection: Collection,
    ) -> SpaceResult<()> {
        let mut dbs = self.databases.write();
        let entry =
            dbs.get_mut(&collection.database)
                .ok_or_else(|| CatalogError::DatabaseNotFound {
                    name: collection.database.clone(),
                })?;
        debug!(
            database = %collection.database,
            collection = %collection.name,
            engine = %collection.engine,
            "catalog: collection stored"
        );
        entry
            .collections
            .insert(collection.name.clone(), collection);
        Ok(())
    }

    /// Выдаёт пользователю уровень доступа к базе.
    pub fn grant(
        &self,
        database: &str,
        user_id: &str,
        level: PermissionLevel,
    ) -> SpaceResult<()> {
        let mut dbs = self.databases.write();
        let entry = dbs
            .get_mut(database)
            .ok_or_else(|| CatalogError::DatabaseNotFound {
                name: database.to_string(),
            })?;
        entry.database.users.insert(user_id.to_string(), level);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для InMemoryCatalog
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_database(
        &self,
        name: &str,
    ) -> SpaceResult<Database> {
        self.databases
            .read()
            .get(name)
            .map(|e| e.database.clone())
            .ok_or_else(|| {
                CatalogError::DatabaseNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    async fn get_collection(
        &self,
        database: &str,
        name: &str,
    ) -> SpaceResult<Collection> {
        self.databases
            .read()
            .get(database)
            .and_then(|e| e.collections.get(name).cloned())
            .ok_or_else(|| {
                CatalogError::CollectionNotFound {
                    database: database.to_string(),
                    name: name.to_string(),
                }
                .into()
            })
    }

    async fn list_all(&self) -> SpaceResult<Vec<(Database, Vec<Collection>)>> {
        Ok(self
            .databases
            .read()
            .values()
            .map(|e| (e.database.clone(), e.collections.values().cloned().collect()))
            .collect())
    }
}
