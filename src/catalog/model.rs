use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use spacestore_error::CodecError;

use crate::codec::{FromValue, Record, RecordReader, ToValue, Value};

/// Уровень доступа пользователя к базе данных.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PermissionLevel {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// Движок коллекции.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineKind {
    #[default]
    KeyValue,
    Object,
    Broker,
}

/// Настройки KV-коллекции.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KvSettings {
    pub disable_ttl: bool,
}

/// База данных: имя и ACL `user_id → уровень`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Database {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub users: BTreeMap<String, PermissionLevel>,
}

/// Коллекция внутри базы данных.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Collection {
    pub database: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub engine: EngineKind,
    pub kv_settings: Option<KvSettings>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PermissionLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::ReadWrite => "read_write",
        }
    }

    /// Уровень `self` покрывает `required`.
    pub fn satisfies(
        self,
        required: PermissionLevel,
    ) -> bool {
        self >= required
    }
}

impl EngineKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeyValue => "kv",
            Self::Object => "object",
            Self::Broker => "broker",
        }
    }
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            users: BTreeMap::new(),
        }
    }

    pub fn with_user(
        mut self,
        user_id: impl Into<String>,
        level: PermissionLevel,
    ) -> Self {
        self.users.insert(user_id.into(), level);
        self
    }

    /// Есть ли у пользователя уровень не ниже `required`.
    pub fn has_permission(
        &self,
        user_id: &str,
        required: PermissionLevel,
    ) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|level| level.satisfies(required))
    }
}

impl Collection {
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        engine: EngineKind,
    ) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            created_at: Utc::now(),
            engine,
            kv_settings: (engine == EngineKind::KeyValue).then(KvSettings::default),
        }
    }

    pub fn with_kv_settings(
        mut self,
        settings: KvSettings,
    ) -> Self {
        self.kv_settings = Some(settings);
        self
    }

    pub fn ttl_disabled(&self) -> bool {
        self.kv_settings.is_some_and(|s| s.disable_ttl)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for PermissionLevel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_only" => Ok(Self::ReadOnly),
            "read_write" => Ok(Self::ReadWrite),
            other => Err(CodecError::field(
                "permission",
                format!("unknown level `{other}`"),
            )),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kv" => Ok(Self::KeyValue),
            "object" => Ok(Self::Object),
            "broker" => Ok(Self::Broker),
            other => Err(CodecError::field("engine", format!("unknown engine `{other}`"))),
        }
    }
}

impl ToValue for PermissionLevel {
    fn to_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl FromValue for PermissionLevel {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        String::from_value(value)?.parse()
    }
}

impl ToValue for EngineKind {
    fn to_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl FromValue for EngineKind {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        String::from_value(value)?.parse()
    }
}

impl ToValue for KvSettings {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("disable_ttl".to_string(), Value::Bool(self.disable_ttl));
        Value::Map(map)
    }
}

impl FromValue for KvSettings {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let map = BTreeMap::<String, bool>::from_value(value)?;
        Ok(Self {
            disable_ttl: map.get("disable_ttl").copied().unwrap_or(false),
        })
    }
}

impl ToValue for Database {
    fn to_value(&self) -> Value {
        Record::new()
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("users", &self.users)
            .into_value()
            .unwrap_or_default()
    }
}

impl FromValue for Database {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let r = RecordReader::new(value)?;
        Ok(Self {
            name: r.field("name")?,
            created_at: r.field("created_at")?,
            users: r.field("users")?,
        })
    }
}

impl ToValue for Collection {
    fn to_value(&self) -> Value {
        Record::new()
            .field("database", &self.database)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("engine", &self.engine)
            .field("kv_settings", &self.kv_settings)
            .into_value()
            .unwrap_or_default()
    }
}

impl FromValue for Collection {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let r = RecordReader::new(value)?;
        Ok(Self {
            database: r.field("database")?,
            name: r.field("name")?,
            created_at: r.field("created_at")?,
            engine: r.field("engine")?,
            kv_settings: r.field("kv_settings")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::codec::{marshal, unmarshal};

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::ReadWrite.satisfies(PermissionLevel::ReadOnly));
        assert!(!PermissionLevel::ReadOnly.satisfies(PermissionLevel::ReadWrite));

        let db = Database::new("d").with_user("u1", PermissionLevel::ReadOnly);
        assert!(db.has_permission("u1", PermissionLevel::ReadOnly));
        assert!(!db.has_permission("u1", PermissionLevel::ReadWrite));
        assert!(!db.has_permission("u2", PermissionLevel::ReadOnly));
    }

    #[test]
    fn test_database_roundtrip() {
        let mut db = Database::new("system").with_user("u1", PermissionLevel::ReadWrite);
        db.created_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let bytes = marshal(&db).unwrap();
        let back: Database = unmarshal(&bytes).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn test_collection_roundtrip() {
        let mut coll = Collection::new("system", "kv_test", EngineKind::KeyValue)
            .with_kv_settings(KvSettings { disable_ttl: true });
        coll.created_at = Utc.timestamp_millis_opt(42).unwrap();

        let back: Collection = unmarshal(&marshal(&coll).unwrap()).unwrap();
        assert_eq!(back, coll);
        assert!(back.ttl_disabled());

        let broker = Collection::new("system", "events", EngineKind::Broker);
        assert_eq!(broker.kv_settings, None);
        let back: Collection = unmarshal(&marshal(&broker).unwrap()).unwrap();
        assert_eq!(back.kv_settings, None);
    }

    #[test]
    fn test_unknown_engine_string() {
        assert!("sql".parse::<EngineKind>().is_err());
        assert_eq!("broker".parse::<EngineKind>().unwrap(), EngineKind::Broker);
    }
}
