//! Разбор тела команды. Любая ошибка формата превращается в `BadRequest`.

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use spacestore_error::{GenericError, SpaceResult, StackError};

use crate::{
    codec::{Decoder, Value},
    protocol::WireReader,
};

/// Последовательное чтение полей тела команды.
#[derive(Debug, Clone)]
pub struct Payload<'a> {
    reader: WireReader<'a>,
}

fn bad_request(
    field: &str,
    err: impl fmt::Display,
) -> StackError {
    GenericError::bad_request(format!("malformed {field}: {err}")).into()
}

impl<'a> Payload<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self {
            reader: WireReader::new(body),
        }
    }

    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// Строка с префиксом `u16`.
    pub fn key(
        &mut self,
        field: &'static str,
    ) -> SpaceResult<&'a str> {
        let key = self
            .reader
            .short_str(field)
            .map_err(|e| bad_request(field, e))?;
        if key.is_empty() {
            return Err(GenericError::bad_request(format!("{field} is empty")).into());
        }
        Ok(key)
    }

    /// Момент истечения: `i64` наносекунд Unix.
    pub fn expires_at(&mut self) -> SpaceResult<i64> {
        self.reader.i64().map_err(|e| bad_request("expires_at", e))
    }

    /// Применяет `read` к закодированному значению и сдвигает курсор на
    /// прочитанную длину.
    fn codec<T>(
        &mut self,
        field: &'static str,
        read: impl FnOnce(&mut Decoder<'a>) -> Result<T, spacestore_error::CodecError>,
    ) -> SpaceResult<(T, usize)> {
        let mut decoder = Decoder::new(self.reader.rest());
        let out = read(&mut decoder).map_err(|e| bad_request(field, e))?;
        let consumed = decoder.position();
        self.reader
            .take(consumed)
            .map_err(|e| bad_request(field, e))?;
        Ok((out, consumed))
    }

    /// Значение и его закодированный размер.
    pub fn value(&mut self) -> SpaceResult<(Value, u64)> {
        self.codec("value", Decoder::read_value)
            .map(|(v, n)| (v, n as u64))
    }

    pub fn string_list(
        &mut self,
        field: &'static str,
    ) -> SpaceResult<Vec<String>> {
        self.codec(field, Decoder::read_string_list).map(|(v, _)| v)
    }

    pub fn value_map(
        &mut self,
        field: &'static str,
    ) -> SpaceResult<BTreeMap<String, Value>> {
        self.codec(field, Decoder::read_map).map(|(v, _)| v)
    }

    pub fn binary(
        &mut self,
        field: &'static str,
    ) -> SpaceResult<Bytes> {
        self.codec(field, Decoder::read_binary).map(|(v, _)| v)
    }
}
