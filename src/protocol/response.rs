use bytes::Bytes;
use spacestore_error::{CodecError, StatusCode, WireError};

use super::{
    command::short_len,
    message::{encode_frame_with, MessageKind},
    WireReader,
};
use crate::codec::{encode_binary_into, Decoder};

/// `request_id`, которым помечаются рассылки брокера.
pub const DELIVERY_REQUEST_ID: u32 = 0;

/// Ответ сервера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub request_id: u32,
    pub status: StatusCode,
    pub body: Bytes,
}

/// Сообщение брокера, пришедшее подписчику.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subject: String,
    pub payload: Bytes,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Response {
    pub fn new(
        request_id: u32,
        status: StatusCode,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            request_id,
            status,
            body: body.into(),
        }
    }

    pub fn ok(
        request_id: u32,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::new(request_id, StatusCode::Ok, body)
    }

    pub fn empty(
        request_id: u32,
        status: StatusCode,
    ) -> Self {
        Self::new(request_id, status, Bytes::new())
    }

    /// Ответ с ошибкой и коротким текстом причины в теле.
    pub fn error(
        request_id: u32,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self::new(request_id, status, Bytes::from(message.into()))
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Рассылка брокера: `request_id = 0`, статус OK,
    /// тело `subject_len: u16 | subject | Binary(payload)`.
    pub fn delivery(
        subject: &str,
        payload: &[u8],
    ) -> Result<Self, WireError> {
        let subject_len = short_len("subject", subject)?;
        let mut body = Vec::with_capacity(2 + subject.len() + 5 + payload.len());
        body.extend_from_slice(&subject_len.to_be_bytes());
        body.extend_from_slice(subject.as_bytes());
        encode_binary_into(payload, &mut body).map_err(|_| WireError::FieldTooLong {
            field: "payload",
            len: payload.len(),
        })?;
        Ok(Self::ok(DELIVERY_REQUEST_ID, body))
    }

    pub fn is_delivery(&self) -> bool {
        self.request_id == DELIVERY_REQUEST_ID && self.is_ok()
    }

    pub fn encoded_len(&self) -> usize {
        4 + 2 + 4 + self.body.len()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(payload);
        let request_id = r.u32()?;
        let code = r.u16()?;
        let status = StatusCode::from_u16(code).ok_or(WireError::UnknownStatus { code })?;
        let body = Bytes::copy_from_slice(r.long_bytes()?);
        Ok(Self {
            request_id,
            status,
            body,
        })
    }

    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        let body_len = u32::try_from(self.body.len()).map_err(|_| WireError::FieldTooLong {
            field: "body",
            len: self.body.len(),
        })?;
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.request_id.to_be_bytes());
        buf.extend_from_slice(&self.status.code().to_be_bytes());
        buf.extend_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(&self.body);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Собирает полный кадр с ответом в переиспользуемом буфере.
    pub fn encode_frame(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        encode_frame_with(buf, MessageKind::Response, 0, self.encoded_len(), |b| {
            self.encode_into(b)
        })
    }

    /// Текст ошибки из тела (для ответов с ошибочным статусом).
    pub fn error_message(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Delivery {
    /// Разбирает тело рассылки.
    pub fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let mut r = WireReader::new(body);
        let subject = r
            .short_str("subject")
            .map_err(|e| CodecError::field("subject", e.to_string()))?
            .to_string();
        let payload = Decoder::new(r.rest()).read_binary()?;
        Ok(Self { subject, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let resp = Response::ok(9, &b"xy"[..]);
        let bytes = resp.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 9, 0, 1, 0, 0, 0, 2, b'x', b'y']);
        assert_eq!(Response::decode(&bytes).unwrap(), resp);
    }

    #[test]
    fn test_unknown_status() {
        let bytes = [0, 0, 0, 1, 0x0B, 0xB8, 0, 0, 0, 0];
        assert!(matches!(
            Response::decode(&bytes),
            Err(WireError::UnknownStatus { code: 3000 })
        ));
    }

    /// Тест проверяет раскладку тела рассылки брокера.
    #[test]
    fn test_delivery_layout() {
        let resp = Response::delivery("orders", &[0x01]).unwrap();
        assert_eq!(resp.request_id, 0);
        assert!(resp.is_delivery());
        assert_eq!(
            resp.body.as_ref(),
            &[0, 6, b'o', b'r', b'd', b'e', b'r', b's', 11, 0, 0, 0, 1, 0x01]
        );

        let delivery = Delivery::decode(&resp.body).unwrap();
        assert_eq!(delivery.subject, "orders");
        assert_eq!(delivery.payload.as_ref(), &[0x01]);
    }

    #[test]
    fn test_error_body_is_message() {
        let resp = Response::error(3, StatusCode::Forbidden, "no write access");
        assert!(!resp.is_ok());
        assert_eq!(resp.error_message(), "no write access");
    }
}
