//! Самоописывающий кодек значений.
//!
//! Каждое значение кодируется как `kind: u8 | body`. Все целые числа и длины
//! записываются в big-endian.
//!
//! | Kind                      | Body                                              |
//! |---------------------------|---------------------------------------------------|
//! | Empty                     | —                                                 |
//! | Bool / Byte               | 1 байт                                            |
//! | Uint16 / Int16            | 2 байта                                           |
//! | Uint32 / Int32 / Float32  | 4 байта (IEEE-754 для float)                      |
//! | Uint64 / Int64 / Float64  | 8 байт (IEEE-754 для float)                       |
//! | Binary / String           | `len: u32 | bytes`                                |
//! | List                      | `elem_kind: u8 | count: u16 | body_len: u32 | ..` |
//! | Map                       | `value_kind: u8 | count: u16 | body_len: u32 | ..`|
//!
//! Элементы списка и значения словаря обязаны иметь один тип, `Empty`
//! допускается как «дырка».

mod decode;
mod encode;
pub mod marshal;

use std::collections::BTreeMap;

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub use decode::{decode, decode_as, decode_prefix, Decoder, MAX_NESTING_DEPTH};
pub use encode::{encode_binary_into, encode_string_into};
pub use marshal::{marshal, unmarshal, FromValue, Record, RecordReader, ToValue};

/// Дискриминатор типа значения (первый байт кодировки).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ValueKind {
    Empty = 0,
    Bool = 1,
    Byte = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    Int16 = 6,
    Int32 = 7,
    Int64 = 8,
    Float32 = 9,
    Float64 = 10,
    Binary = 11,
    String = 12,
    List = 13,
    Map = 14,
}

/// Типизированное значение.
///
/// Дерево без обратных ссылок: списки и словари владеют вложенными
/// значениями. Словарь упорядочен по ключу, чтобы кодировка была
/// детерминированной.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Byte(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Binary(Bytes),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl ValueKind {
    /// Длина тела для типов фиксированного размера.
    pub const fn fixed_body_len(self) -> Option<usize> {
        match self {
            Self::Empty => Some(0),
            Self::Bool | Self::Byte => Some(1),
            Self::Uint16 | Self::Int16 => Some(2),
            Self::Uint32 | Self::Int32 | Self::Float32 => Some(4),
            Self::Uint64 | Self::Int64 | Self::Float64 => Some(8),
            Self::Binary | Self::String | Self::List | Self::Map => None,
        }
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Empty => ValueKind::Empty,
            Value::Bool(_) => ValueKind::Bool,
            Value::Byte(_) => ValueKind::Byte,
            Value::Uint16(_) => ValueKind::Uint16,
            Value::Uint32(_) => ValueKind::Uint32,
            Value::Uint64(_) => ValueKind::Uint64,
            Value::Int16(_) => ValueKind::Int16,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Float32(_) => ValueKind::Float32,
            Value::Float64(_) => ValueKind::Float64,
            Value::Binary(_) => ValueKind::Binary,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Список строк, например набор ключей.
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для Value
////////////////////////////////////////////////////////////////////////////////

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
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

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}
