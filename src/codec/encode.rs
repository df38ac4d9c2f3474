use bytes::Bytes;
use spacestore_error::CodecError;

use super::{Value, ValueKind};

/// Заголовок списка и словаря: `kind: u8 | count: u16 | body_len: u32`.
pub(crate) const CONTAINER_HEADER_LEN: usize = 1 + 2 + 4;

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Value {
    /// Полная длина кодировки значения вместе с байтом типа.
    ///
    /// Считается за один проход по дереву, без промежуточного кодирования.
    pub fn encoded_size(&self) -> usize {
        1 + self.body_size()
    }

    /// Добавляет кодировку значения в конец `buf`.
    ///
    /// При ошибке `buf` может содержать частично записанные байты.
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        buf.push(self.kind().tag());
        match self {
            Value::Empty => {}
            Value::Bool(v) => buf.push(u8::from(*v)),
            Value::Byte(v) => buf.push(*v),
            Value::Uint16(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Value::Uint32(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Value::Uint64(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Value::Int16(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Value::Int32(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Value::Int64(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Value::Float32(v) => buf.extend_from_slice(&v.to_bits().to_be_bytes()),
            Value::Float64(v) => buf.extend_from_slice(&v.to_bits().to_be_bytes()),
            Value::Binary(b) => put_bytes(buf, b)?,
            Value::String(s) => put_bytes(buf, s.as_bytes())?,
            Value::List(items) => {
                let elem_kind = uniform_kind(items.iter())?;
                let body_len = items.iter().map(Value::encoded_size).sum::<usize>();
                put_container_header(buf, elem_kind, items.len(), body_len)?;
                for item in items {
                    item.encode_into(buf)?;
                }
            }
            Value::Map(map) => {
                let value_kind = uniform_kind(map.values())?;
                let body_len = map
                    .iter()
                    .map(|(k, v)| string_size(k) + v.encoded_size())
                    .sum::<usize>();
                put_container_header(buf, value_kind, map.len(), body_len)?;
                for (key, value) in map {
                    buf.push(ValueKind::String.tag());
                    put_bytes(buf, key.as_bytes())?;
                    value.encode_into(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Кодирует значение в новый буфер точного размера.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn body_size(&self) -> usize {
        if let Some(fixed) = self.kind().fixed_body_len() {
            return fixed;
        }
        match self {
            Value::Binary(b) => 4 + b.len(),
            Value::String(s) => 4 + s.len(),
            Value::List(items) => {
                CONTAINER_HEADER_LEN + items.iter().map(Value::encoded_size).sum::<usize>()
            }
            Value::Map(map) => {
                CONTAINER_HEADER_LEN
                    + map
                        .iter()
                        .map(|(k, v)| string_size(k) + v.encoded_size())
                        .sum::<usize>()
            }
            _ => 0,
        }
    }
}

/// Кодирует строку как `Value::String` без выделения промежуточного
/// значения.
pub fn encode_string_into(
    s: &str,
    buf: &mut Vec<u8>,
) -> Result<(), CodecError> {
    buf.push(ValueKind::String.tag());
    put_bytes(buf, s.as_bytes())
}

/// Кодирует срез как `Value::Binary`.
pub fn encode_binary_into(
    data: &[u8],
    buf: &mut Vec<u8>,
) -> Result<(), CodecError> {
    buf.push(ValueKind::Binary.tag());
    put_bytes(buf, data)
}

fn string_size(s: &str) -> usize {
    1 + 4 + s.len()
}

/// Общий тип элементов: первый не-`Empty` элемент задаёт тип, остальные
/// обязаны совпадать с ним или быть `Empty`.
fn uniform_kind<'a>(items: impl Iterator<Item = &'a Value>) -> Result<ValueKind, CodecError> {
    let mut declared = ValueKind::Empty;
    for item in items {
        let kind = item.kind();
        if kind == ValueKind::Empty {
            continue;
        }
        if declared == ValueKind::Empty {
            declared = kind;
        } else if declared != kind {
            return Err(CodecError::MixedKinds {
                expected: declared.tag(),
                found: kind.tag(),
            });
        }
    }
    Ok(declared)
}

fn put_container_header(
    buf: &mut Vec<u8>,
    kind: ValueKind,
    count: usize,
    body_len: usize,
) -> Result<(), CodecError> {
    let count = u16::try_from(count).map_err(|_| CodecError::TooManyElements { count })?;
    let body = u32::try_from(body_len).map_err(|_| CodecError::BodyTooLarge { len: body_len })?;
    buf.push(kind.tag());
    buf.extend_from_slice(&count.to_be_bytes());
    buf.extend_from_slice(&body.to_be_bytes());
    Ok(())
}

fn put_bytes(
    buf: &mut Vec<u8>,
    data: &[u8],
) -> Result<(), CodecError> {
    let len = u32::try_from(data.len()).map_err(|_| CodecError::BodyTooLarge { len: data.len() })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
