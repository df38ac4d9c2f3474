use bytes::Bytes;
use spacestore_error::WireError;

use super::{
    message::{encode_frame_with, MessageKind},
    WireReader,
};

/// Команда клиента.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub request_id: u32,
    pub command_id: u16,
    pub database: String,
    pub collection: String,
    pub body: Bytes,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Command {
    pub fn new(
        request_id: u32,
        command_id: impl Into<u16>,
    ) -> Self {
        Self {
            request_id,
            command_id: command_id.into(),
            ..Self::default()
        }
    }

    pub fn with_target(
        mut self,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        self.database = database.into();
        self.collection = collection.into();
        self
    }

    pub fn with_body(
        mut self,
        body: impl Into<Bytes>,
    ) -> Self {
        self.body = body.into();
        self
    }

    /// Длина закодированной нагрузки команды.
    pub fn encoded_len(&self) -> usize {
        4 + 2 + 2 + self.database.len() + 2 + self.collection.len() + 4 + self.body.len()
    }

    /// Разбирает нагрузку команды из конверта.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(payload);
        let request_id = r.u32()?;
        let command_id = r.u16()?;
        let database = r.short_str("database")?.to_string();
        let collection = r.short_str("collection")?.to_string();
        let body = Bytes::copy_from_slice(r.long_bytes()?);
        Ok(Self {
            request_id,
            command_id,
            database,
            collection,
            body,
        })
    }

    /// Дописывает нагрузку команды в `buf`.
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        let db_len = short_len("database", &self.database)?;
        let coll_len = short_len("collection", &self.collection)?;
        let body_len = u32::try_from(self.body.len()).map_err(|_| WireError::FieldTooLong {
            field: "body",
            len: self.body.len(),
        })?;

        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.request_id.to_be_bytes());
        buf.extend_from_slice(&self.command_id.to_be_bytes());
        buf.extend_from_slice(&db_len.to_be_bytes());
        buf.extend_from_slice(self.database.as_bytes());
        buf.extend_from_slice(&coll_len.to_be_bytes());
        buf.extend_from_slice(self.collection.as_bytes());
        buf.extend_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(&self.body);
        Ok(())
    }

    /// Кодирует нагрузку в новый буфер.
    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Собирает полный кадр с командой в переиспользуемом буфере.
    pub fn encode_frame(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        encode_frame_with(buf, MessageKind::Command, 0, self.encoded_len(), |b| {
            self.encode_into(b)
        })
    }
}

pub(crate) fn short_len(
    field: &'static str,
    s: &str,
) -> Result<u16, WireError> {
    u16::try_from(s.len()).map_err(|_| WireError::FieldTooLong {
        field,
        len: s.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_frame_into, Message};

    fn sample() -> Command {
        Command::new(8, 2000u16)
            .with_target("d", "c")
            .with_body(&b"\x00\x01k"[..])
    }

    #[test]
    fn test_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[
                0, 0, 0, 8, // request_id
                0x07, 0xD0, // command_id
                0, 1, b'd', // database
                0, 1, b'c', // collection
                0, 0, 0, 3, 0, 1, b'k', // body
            ]
        );
        assert_eq!(bytes.len(), sample().encoded_len());
        assert_eq!(Command::decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_bytes().unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(
                    Command::decode(&bytes[..cut]),
                    Err(WireError::PayloadTooShort { .. })
                ),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_invalid_utf8_database() {
        let mut bytes = sample().to_bytes().unwrap().to_vec();
        bytes[8] = 0xFF;
        assert!(matches!(
            Command::decode(&bytes),
            Err(WireError::InvalidUtf8 { field: "database" })
        ));
    }

    #[test]
    fn test_database_too_long() {
        let cmd = Command::new(1, 1u16).with_target("x".repeat(70_000), "c");
        assert!(matches!(
            cmd.to_bytes(),
            Err(WireError::FieldTooLong { field: "database", .. })
        ));
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        sample().encode_frame(&mut buf).unwrap();

        let mut input: &[u8] = &buf;
        let mut frame = Vec::new();
        read_frame_into(&mut input, &mut frame).await.unwrap();
        let msg = Message::decode(&frame).unwrap();
        assert_eq!(msg.kind, MessageKind::Command);
        assert_eq!(Command::decode(msg.payload).unwrap(), sample());
    }
}
