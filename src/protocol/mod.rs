//! Бинарный протокол: кадры, конверт сообщения, команды и ответы.
//!
//! ```text
//! frame:    length: u32 | body
//! body:     magic | version | flags | kind | payload_len: u32 | payload
//! command:  request_id: u32 | command_id: u16 | db: u16+bytes | coll: u16+bytes | body: u32+bytes
//! response: request_id: u32 | status: u16 | body: u32+bytes
//! ```
//!
//! Все числа передаются в big-endian.

pub mod command;
pub mod command_id;
pub mod frame;
pub mod message;
pub mod response;

pub use command::Command;
pub use command_id::CommandId;
pub use frame::{check_frame_len, read_frame_into, write_frame, MAX_FRAME_LEN};
pub use message::{
    encode_frame_with, recover_request_id, Message, MessageKind, MAGIC, PROTOCOL_VERSION,
    SUPPORTED_VERSIONS,
};
pub use response::{Delivery, Response, DELIVERY_REQUEST_ID};
use spacestore_error::WireError;

/// Курсор по полям протокола: целые числа и строки с префиксом длины.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn take(
        &mut self,
        len: usize,
    ) -> Result<&'a [u8], WireError> {
        let available = self.remaining();
        if available < len {
            return Err(WireError::PayloadTooShort {
                needed: len,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, WireError> {
        self.array().map(u16::from_be_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        self.array().map(u32::from_be_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, WireError> {
        self.array().map(u64::from_be_bytes)
    }

    pub fn i64(&mut self) -> Result<i64, WireError> {
        self.array().map(i64::from_be_bytes)
    }

    /// Байты с префиксом длины `u16`.
    pub fn short_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// UTF-8 строка с префиксом длины `u16`.
    pub fn short_str(
        &mut self,
        field: &'static str,
    ) -> Result<&'a str, WireError> {
        let raw = self.short_bytes()?;
        std::str::from_utf8(raw).map_err(|_| WireError::InvalidUtf8 { field })
    }

    /// Байты с префиксом длины `u32`.
    pub fn long_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

/// Дописывает строку с префиксом длины `u16`.
pub fn put_short_str(
    buf: &mut Vec<u8>,
    field: &'static str,
    s: &str,
) -> Result<(), WireError> {
    let len = command::short_len(field, s)?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_fields() {
        let mut buf = vec![1, 0, 2];
        put_short_str(&mut buf, "key", "ab").unwrap();
        buf.extend_from_slice(&(-1i64).to_be_bytes());

        let mut r = WireReader::new(&buf);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 2);
        assert_eq!(r.short_str("key").unwrap(), "ab");
        assert_eq!(r.i64().unwrap(), -1);
        assert_eq!(r.remaining(), 0);
        assert!(matches!(r.u8(), Err(WireError::PayloadTooShort { .. })));
    }
}
