//! Преобразование записей в значения кодека и обратно.
//!
//! Запись кодируется как `Map`, где ключ это имя поля, а значение это поле,
//! упакованное в `Binary` (полная кодировка поля). Упаковка делает словарь
//! однородным даже для записей с полями разных типов.
//!
//! Время передаётся как `Map{"millis": Int64}` с числом миллисекунд от эпохи.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use spacestore_error::CodecError;

use super::{decode, Value, ValueKind};

/// Ключ миллисекунд в представлении времени.
pub const TIME_MILLIS_KEY: &str = "millis";

/// Тип, который умеет представить себя значением кодека.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Тип, который можно восстановить из значения кодека.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, CodecError>;
}

/// Кодирует запись в байты.
pub fn marshal<T: ToValue>(value: &T) -> Result<Bytes, CodecError> {
    value.to_value().encode()
}

/// Декодирует запись из байт.
pub fn unmarshal<T: FromValue>(buf: &[u8]) -> Result<T, CodecError> {
    T::from_value(&decode(buf)?)
}

/// Построитель записи.
///
/// ```
/// use spacestore::codec::{Record, RecordReader, Value};
///
/// let value = Record::new()
///     .field("name", &"system".to_string())
///     .field("active", &true)
///     .into_value()
///     .unwrap();
///
/// let reader = RecordReader::new(&value).unwrap();
/// let name: String = reader.field("name").unwrap();
/// assert_eq!(name, "system");
/// ```
#[derive(Debug, Default)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

/// Чтение полей записи по имени.
///
/// Отсутствующее поле превращается в значение по умолчанию своего типа.
#[derive(Debug)]
pub struct RecordReader {
    fields: BTreeMap<String, Value>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<T: ToValue + ?Sized>(
        mut self,
        name: &'static str,
        value: &T,
    ) -> Self {
        self.fields.push((name, value.to_value()));
        self
    }

    /// Упаковывает поля и собирает итоговый `Map`.
    pub fn into_value(self) -> Result<Value, CodecError> {
        let mut map = BTreeMap::new();
        for (name, value) in self.fields {
            let boxed = value
                .encode()
                .map_err(|e| CodecError::field(name, e.to_string()))?;
            map.insert(name.to_string(), Value::Binary(boxed));
        }
        Ok(Value::Map(map))
    }
}

impl RecordReader {
    pub fn new(value: &Value) -> Result<Self, CodecError> {
        let map = value.as_map().ok_or(CodecError::InvalidType {
            expected: Some(ValueKind::Map.tag()),
            found: value.kind().tag(),
        })?;

        let mut fields = BTreeMap::new();
        for (name, boxed) in map {
            let inner = match boxed {
                Value::Binary(raw) => {
                    decode(raw).map_err(|e| CodecError::field(name.as_str(), e.to_string()))?
                }
                Value::Empty => Value::Empty,
                other => {
                    return Err(CodecError::field(
                        name.as_str(),
                        format!("expected packed field, found kind {}", other.kind().tag()),
                    ))
                }
            };
            fields.insert(name.clone(), inner);
        }
        Ok(Self { fields })
    }

    pub fn field<T: FromValue + Default>(
        &self,
        name: &str,
    ) -> Result<T, CodecError> {
        match self.fields.get(name) {
            None | Some(Value::Empty) => Ok(T::default()),
            Some(v) => T::from_value(v).map_err(|e| CodecError::field(name, e.to_string())),
        }
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.fields.contains_key(name)
    }
}

fn mismatch(
    expected: ValueKind,
    found: &Value,
) -> CodecError {
    CodecError::InvalidType {
        expected: Some(expected.tag()),
        found: found.kind().tag(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализации для примитивов
////////////////////////////////////////////////////////////////////////////////

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, CodecError> {
                    match value {
                        Value::$variant(v) => Ok(v.clone()),
                        other => Err(mismatch(ValueKind::$variant, other)),
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    bool => Bool,
    u8 => Byte,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Bytes => Binary,
    String => String,
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        Ok(value.clone())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Empty,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Empty => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let items = value.as_list().ok_or_else(|| mismatch(ValueKind::List, value))?;
        items.iter().map(T::from_value).collect()
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let map = value.as_map().ok_or_else(|| mismatch(ValueKind::Map, value))?;
        map.iter()
            .map(|(k, v)| Ok((k.clone(), T::from_value(v)?)))
            .collect()
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let map = value.as_map().ok_or_else(|| mismatch(ValueKind::Map, value))?;
        map.iter()
            .map(|(k, v)| Ok((k.clone(), T::from_value(v)?)))
            .collect()
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            TIME_MILLIS_KEY.to_string(),
            Value::Int64(self.timestamp_millis()),
        );
        Value::Map(map)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let map = value.as_map().ok_or_else(|| mismatch(ValueKind::Map, value))?;
        let millis = match map.get(TIME_MILLIS_KEY) {
            Some(Value::Int64(ms)) => *ms,
            Some(other) => return Err(mismatch(ValueKind::Int64, other)),
            None => 0,
        };
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CodecError::field(TIME_MILLIS_KEY, format!("out of range: {millis}")))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
