use num_enum::{IntoPrimitive, TryFromPrimitive};
use spacestore_error::WireError;

use super::frame::{begin_frame, finish_frame};

/// Magic-байт в начале каждого сообщения.
pub const MAGIC: u8 = 0x7E;
/// Текущая версия протокола.
pub const PROTOCOL_VERSION: u8 = 1;
/// Все версии, которые понимает сервер.
pub const SUPPORTED_VERSIONS: &[u8] = &[PROTOCOL_VERSION];
/// `magic | version | flags | kind | payload_len: u32`.
pub const ENVELOPE_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Command = 1,
    Response = 2,
}

/// Разобранный конверт. Полезная нагрузка ссылается на буфер кадра.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub version: u8,
    pub flags: u8,
    pub kind: MessageKind,
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    /// Разбирает конверт. Байты после полезной нагрузки игнорируются.
    pub fn decode(buf: &'a [u8]) -> Result<Self, WireError> {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return Err(WireError::PayloadTooShort {
                needed: ENVELOPE_HEADER_LEN,
                available: buf.len(),
            });
        }
        if buf[0] != MAGIC {
            return Err(WireError::MagicInvalid { found: buf[0] });
        }
        if buf[1] != PROTOCOL_VERSION {
            return Err(WireError::ProtocolVersionInvalid { found: buf[1] });
        }
        let flags = buf[2];
        let kind = MessageKind::try_from(buf[3])
            .map_err(|_| WireError::UnknownMessageKind { found: buf[3] })?;
        let payload_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if payload_len == 0 {
            return Err(WireError::EmptyPayload);
        }
        let available = buf.len() - ENVELOPE_HEADER_LEN;
        if available < payload_len {
            return Err(WireError::PayloadTooShort {
                needed: payload_len,
                available,
            });
        }

        Ok(Self {
            version: buf[1],
            flags,
            kind,
            payload: &buf[ENVELOPE_HEADER_LEN..ENVELOPE_HEADER_LEN + payload_len],
        })
    }

    /// Дописывает конверт с готовой нагрузкой в `buf`.
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        let at = begin_envelope(buf, self.kind, self.flags);
        buf.extend_from_slice(self.payload);
        finish_envelope(buf, at)
    }
}

/// Пишет заголовок конверта с нулевой длиной и возвращает его смещение.
fn begin_envelope(
    buf: &mut Vec<u8>,
    kind: MessageKind,
    flags: u8,
) -> usize {
    let at = buf.len();
    buf.extend_from_slice(&[MAGIC, PROTOCOL_VERSION, flags, kind.into(), 0, 0, 0, 0]);
    at
}

fn finish_envelope(
    buf: &mut [u8],
    at: usize,
) -> Result<(), WireError> {
    let payload_len = buf.len() - at - ENVELOPE_HEADER_LEN;
    if payload_len == 0 {
        return Err(WireError::EmptyPayload);
    }
    let len = u32::try_from(payload_len).map_err(|_| WireError::FieldTooLong {
        field: "payload",
        len: payload_len,
    })?;
    buf[at + 4..at + ENVELOPE_HEADER_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Собирает полный кадр `length | envelope | payload` в `buf`.
///
/// Буфер очищается, его ёмкость переиспользуется. Нагрузку пишет
/// `write_payload` прямо в буфер, без промежуточной копии.
pub fn encode_frame_with<F>(
    buf: &mut Vec<u8>,
    kind: MessageKind,
    flags: u8,
    payload_hint: usize,
    write_payload: F,
) -> Result<(), WireError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), WireError>,
{
    buf.clear();
    buf.reserve(4 + ENVELOPE_HEADER_LEN + payload_hint);
    let frame_at = begin_frame(buf);
    let envelope_at = begin_envelope(buf, kind, flags);
    write_payload(buf)?;
    finish_envelope(buf, envelope_at)?;
    finish_frame(buf, frame_at)
}

/// Достаёт `request_id` из кадра, конверт которого не разобрался.
///
/// Идентификатор лежит сразу за заголовком конверта (смещение 8..12). Если
/// байт не хватает, возвращается 0.
pub fn recover_request_id(frame: &[u8]) -> u32 {
    match frame.get(ENVELOPE_HEADER_LEN..ENVELOPE_HEADER_LEN + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}
