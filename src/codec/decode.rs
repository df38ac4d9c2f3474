use std::collections::{btree_map::Entry, BTreeMap};

use bytes::Bytes;
use spacestore_error::CodecError;

use super::{encode::CONTAINER_HEADER_LEN, Value, ValueKind};

/// Максимальная вложенность списков и словарей.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Курсор для последовательного чтения значений из буфера.
///
/// Курсор не владеет буфером и никогда не читает за его пределами: каждая
/// операция сначала проверяет оставшуюся длину.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Сколько байт уже прочитано.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Непрочитанный остаток буфера.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Читает одно значение любого типа.
    pub fn read_value(&mut self) -> Result<Value, CodecError> {
        self.read_value_at_depth(0)
    }

    /// Читает значение и проверяет, что его тип совпадает с `kind`.
    pub fn read_value_as(
        &mut self,
        kind: ValueKind,
    ) -> Result<Value, CodecError> {
        let found = self.peek_u8()?;
        if found != kind.tag() {
            return Err(CodecError::InvalidType {
                expected: Some(kind.tag()),
                found,
            });
        }
        self.read_value()
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        match self.read_value_as(ValueKind::String)? {
            Value::String(s) => Ok(s),
            other => Err(unexpected(ValueKind::String, &other)),
        }
    }

    pub fn read_binary(&mut self) -> Result<Bytes, CodecError> {
        match self.read_value_as(ValueKind::Binary)? {
            Value::Binary(b) => Ok(b),
            other => Err(unexpected(ValueKind::Binary, &other)),
        }
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        match self.read_value_as(ValueKind::Int64)? {
            Value::Int64(v) => Ok(v),
            other => Err(unexpected(ValueKind::Int64, &other)),
        }
    }

    /// Читает `List<String>`, например список ключей.
    pub fn read_string_list(&mut self) -> Result<Vec<String>, CodecError> {
        let Value::List(items) = self.read_value_as(ValueKind::List)? else {
            return Err(CodecError::InvalidType {
                expected: Some(ValueKind::List.tag()),
                found: ValueKind::Empty.tag(),
            });
        };
        items
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(unexpected(ValueKind::String, &other)),
            })
            .collect()
    }

    /// Читает `Map` и возвращает его как упорядоченный словарь.
    pub fn read_map(&mut self) -> Result<BTreeMap<String, Value>, CodecError> {
        match self.read_value_as(ValueKind::Map)? {
            Value::Map(map) => Ok(map),
            other => Err(unexpected(ValueKind::Map, &other)),
        }
    }

    fn read_value_at_depth(
        &mut self,
        depth: usize,
    ) -> Result<Value, CodecError> {
        let tag = self.read_u8()?;
        let kind = ValueKind::try_from(tag).map_err(|_| CodecError::InvalidType {
            expected: None,
            found: tag,
        })?;

        let value = match kind {
            ValueKind::Empty => Value::Empty,
            ValueKind::Bool => match self.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                found => {
                    return Err(CodecError::InvalidType {
                        expected: Some(ValueKind::Bool.tag()),
                        found,
                    })
                }
            },
            ValueKind::Byte => Value::Byte(self.read_u8()?),
            ValueKind::Uint16 => Value::Uint16(u16::from_be_bytes(self.read_array()?)),
            ValueKind::Uint32 => Value::Uint32(u32::from_be_bytes(self.read_array()?)),
            ValueKind::Uint64 => Value::Uint64(u64::from_be_bytes(self.read_array()?)),
            ValueKind::Int16 => Value::Int16(i16::from_be_bytes(self.read_array()?)),
            ValueKind::Int32 => Value::Int32(i32::from_be_bytes(self.read_array()?)),
            ValueKind::Int64 => Value::Int64(i64::from_be_bytes(self.read_array()?)),
            ValueKind::Float32 => Value::Float32(f32::from_bits(u32::from_be_bytes(
                self.read_array()?,
            ))),
            ValueKind::Float64 => Value::Float64(f64::from_bits(u64::from_be_bytes(
                self.read_array()?,
            ))),
            ValueKind::Binary => Value::Binary(Bytes::copy_from_slice(self.read_len_prefixed()?)),
            ValueKind::String => {
                let raw = self.read_len_prefixed()?;
                let s = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                Value::String(s.to_string())
            }
            ValueKind::List => {
                let (elem_kind, count, mut body) = self.read_container(depth)?;
                let mut items = Vec::with_capacity(count.min(body.remaining()));
                for _ in 0..count {
                    let item = body.read_value_at_depth(depth + 1)?;
                    check_element(elem_kind, &item)?;
                    items.push(item);
                }
                body.finish()?;
                Value::List(items)
            }
            ValueKind::Map => {
                let (value_kind, count, mut body) = self.read_container(depth)?;
                let mut map = BTreeMap::new();
                for _ in 0..count {
                    let key = match body.read_value_at_depth(depth + 1)? {
                        Value::String(s) => s,
                        other => return Err(unexpected(ValueKind::String, &other)),
                    };
                    let value = body.read_value_at_depth(depth + 1)?;
                    check_element(value_kind, &value)?;
                    match map.entry(key) {
                        Entry::Vacant(slot) => {
                            slot.insert(value);
                        }
                        Entry::Occupied(slot) => {
                            return Err(CodecError::DuplicateKey {
                                key: slot.key().clone(),
                            })
                        }
                    }
                }
                body.finish()?;
                Value::Map(map)
            }
        };
        Ok(value)
    }

    /// Читает заголовок контейнера и возвращает курсор по его телу.
    ///
    /// Основной курсор сдвигается за конец тела целиком.
    fn read_container(
        &mut self,
        depth: usize,
    ) -> Result<(ValueKind, usize, Decoder<'a>), CodecError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(CodecError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        self.ensure(CONTAINER_HEADER_LEN)?;
        let tag = self.read_u8()?;
        let elem_kind = ValueKind::try_from(tag).map_err(|_| CodecError::InvalidType {
            expected: None,
            found: tag,
        })?;
        let count = u16::from_be_bytes(self.read_array()?) as usize;
        let body_len = u32::from_be_bytes(self.read_array()?) as usize;
        let body = self.take(body_len)?;
        Ok((elem_kind, count, Decoder::new(body)))
    }

    /// Тело контейнера должно быть прочитано до конца: иначе число
    /// потреблённых байт разойдётся с закодированным размером значения.
    fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            unused => Err(CodecError::BodyNotConsumed { unused }),
        }
    }

    fn read_len_prefixed(&mut self) -> Result<&'a [u8], CodecError> {
        let len = u32::from_be_bytes(self.read_array()?) as usize;
        self.take(len)
    }

    fn take(
        &mut self,
        len: usize,
    ) -> Result<&'a [u8], CodecError> {
        self.ensure(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_u8(&self) -> Result<u8, CodecError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| CodecError::too_short(1, 0))
    }

    fn ensure(
        &self,
        needed: usize,
    ) -> Result<(), CodecError> {
        let available = self.remaining();
        if available < needed {
            return Err(CodecError::too_short(needed, available));
        }
        Ok(())
    }
}

fn check_element(
    declared: ValueKind,
    item: &Value,
) -> Result<(), CodecError> {
    let kind = item.kind();
    if kind != declared && kind != ValueKind::Empty {
        return Err(CodecError::InvalidType {
            expected: Some(declared.tag()),
            found: kind.tag(),
        });
    }
    Ok(())
}

fn unexpected(
    expected: ValueKind,
    found: &Value,
) -> CodecError {
    CodecError::InvalidType {
        expected: Some(expected.tag()),
        found: found.kind().tag(),
    }
}

/// Декодирует одно значение. Байты после него игнорируются.
pub fn decode(buf: &[u8]) -> Result<Value, CodecError> {
    Decoder::new(buf).read_value()
}

/// Декодирует значение и возвращает число прочитанных байт.
///
/// Для корректной кодировки это число равно `encoded_size` значения, поэтому
/// движок KV использует его для учёта размера без повторного кодирования.
pub fn decode_prefix(buf: &[u8]) -> Result<(Value, usize), CodecError> {
    let mut decoder = Decoder::new(buf);
    let value = decoder.read_value()?;
    Ok((value, decoder.position()))
}

/// Декодирует значение заданного типа.
pub fn decode_as(
    buf: &[u8],
    kind: ValueKind,
) -> Result<Value, CodecError> {
    Decoder::new(buf).read_value_as(kind)
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> Value {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int64(-5));
        map.insert("b".to_string(), Value::Empty);
        map.insert("c".to_string(), Value::Int64(7));
        Value::Map(map)
    }

    /// Тест проверяет чтение значений разных типов подряд из одного буфера.
    #[test]
    fn test_sequential_reads() {
        let mut buf = Vec::new();
        Value::from("key").encode_into(&mut buf).unwrap();
        Value::Int64(42).encode_into(&mut buf).unwrap();
        sample_map().encode_into(&mut buf).unwrap();

        let mut d = Decoder::new(&buf);
        assert_eq!(d.read_string().unwrap(), "key");
        assert_eq!(d.read_i64().unwrap(), 42);
        assert_eq!(Value::Map(d.read_map().unwrap()), sample_map());
        assert!(d.is_exhausted());
    }

    #[test]
    fn test_truncated_fixed_width() {
        let err = decode(&[ValueKind::Uint64.tag(), 0, 0, 0]).unwrap_err();
        assert_eq!(err, CodecError::too_short(8, 3));
        assert!(matches!(decode(&[]), Err(CodecError::PayloadTooShort { .. })));
    }

    #[test]
    fn test_truncated_string_body() {
        let err = decode(&[ValueKind::String.tag(), 0, 0, 0, 5, b'a']).unwrap_err();
        assert_eq!(err, CodecError::too_short(5, 1));
    }

    /// Тест проверяет, что запрошенный тип сверяется с первым байтом.
    #[test]
    fn test_requested_kind_mismatch() {
        let bytes = Value::Int32(1).encode().unwrap();
        assert_eq!(
            decode_as(&bytes, ValueKind::String).unwrap_err(),
            CodecError::InvalidType {
                expected: Some(ValueKind::String.tag()),
                found: ValueKind::Int32.tag(),
            }
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            decode(&[0xEE]).unwrap_err(),
            CodecError::InvalidType {
                expected: None,
                found: 0xEE,
            }
        );
    }

    /// Тест проверяет, что вручную собранный список со смешанными типами
    /// отклоняется декодером.
    #[test]
    fn test_handcrafted_mixed_list() {
        let mut buf = vec![ValueKind::List.tag(), ValueKind::Int32.tag(), 0, 2];
        let mut body = Vec::new();
        Value::Int32(1).encode_into(&mut body).unwrap();
        Value::from("x").encode_into(&mut body).unwrap();
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);

        assert_eq!(
            decode(&buf).unwrap_err(),
            CodecError::InvalidType {
                expected: Some(ValueKind::Int32.tag()),
                found: ValueKind::String.tag(),
            }
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut buf = Value::Uint16(9).encode().unwrap().to_vec();
        buf.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decode(&buf).unwrap(), Value::Uint16(9));

        let (value, used) = decode_prefix(&buf).unwrap();
        assert_eq!(value, Value::Uint16(9));
        assert_eq!(used, 3);
    }

    #[test]
    fn test_prefix_len_equals_encoded_size() {
        let value = Value::List(vec![sample_map(), Value::Empty, sample_map()]);
        let bytes = value.encode().unwrap();
        let (decoded, used) = decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(used, value.encoded_size());
    }

    /// Тест проверяет, что глубокая вложенность не приводит к переполнению
    /// стека.
    #[test]
    fn test_nesting_limit() {
        let mut value = Value::Empty;
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            value = Value::List(vec![value]);
        }
        let bytes = value.encode().unwrap();
        assert_eq!(
            decode(&bytes).unwrap_err(),
            CodecError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH
            }
        );
    }

    #[test]
    fn test_string_list_skips_holes() {
        let value = Value::List(vec![Value::from("a"), Value::Empty, Value::from("b")]);
        let bytes = value.encode().unwrap();
        let keys = Decoder::new(&bytes).read_string_list().unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_bool_accepts_only_zero_and_one() {
        assert_eq!(decode(&[ValueKind::Bool.tag(), 0]).unwrap(), Value::Bool(false));
        assert_eq!(decode(&[ValueKind::Bool.tag(), 1]).unwrap(), Value::Bool(true));
        assert_eq!(
            decode(&[ValueKind::Bool.tag(), 2]).unwrap_err(),
            CodecError::InvalidType {
                expected: Some(ValueKind::Bool.tag()),
                found: 2,
            }
        );
    }

    /// Собирает контейнер с произвольной длиной тела в заголовке.
    fn container(
        kind: ValueKind,
        elem: ValueKind,
        count: u16,
        body_len: u32,
        body: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![kind.tag(), elem.tag()];
        buf.extend_from_slice(&count.to_be_bytes());
        buf.extend_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    /// Тест проверяет, что лишние байты в теле контейнера отклоняются.
    #[test]
    fn test_padded_container_body_rejected() {
        let list = container(ValueKind::List, ValueKind::Byte, 1, 6, &[2, 7, 0, 0, 0, 0]);
        assert_eq!(
            decode(&list).unwrap_err(),
            CodecError::BodyNotConsumed { unused: 4 }
        );

        let mut body = Value::from("a").encode().unwrap().to_vec();
        body.extend_from_slice(&[ValueKind::Byte.tag(), 1, 0xFF]);
        let map = container(ValueKind::Map, ValueKind::Byte, 1, body.len() as u32, &body);
        assert_eq!(
            decode(&map).unwrap_err(),
            CodecError::BodyNotConsumed { unused: 1 }
        );
    }

    #[test]
    fn test_duplicate_map_key_rejected() {
        let mut body = Vec::new();
        for v in [1u8, 2] {
            Value::from("a").encode_into(&mut body).unwrap();
            Value::Byte(v).encode_into(&mut body).unwrap();
        }
        let map = container(ValueKind::Map, ValueKind::Byte, 2, body.len() as u32, &body);
        assert_eq!(
            decode(&map).unwrap_err(),
            CodecError::DuplicateKey {
                key: "a".to_string()
            }
        );
    }
}
