use std::{any::Any, io};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки кадрирования и разбора конверта сообщения.
#[derive(Debug, Error)]
pub enum WireError {
    /// Длина кадра вне диапазона `(0, 16 MiB]`
    #[error("invalid frame length: {length}")]
    FrameLengthInvalid { length: u32 },
    /// Неверный magic-байт
    #[error("invalid magic byte: {found:#04x}")]
    MagicInvalid { found: u8 },
    /// Неподдерживаемая версия протокола
    #[error("invalid protocol version: {found}")]
    ProtocolVersionInvalid { found: u8 },
    /// Неизвестный тип сообщения
    #[error("unknown message kind: {found}")]
    UnknownMessageKind { found: u8 },
    /// Нулевая длина полезной нагрузки
    #[error("empty payload")]
    EmptyPayload,
    /// Данных меньше, чем заявлено заголовком
    #[error("payload too short: need {needed} bytes, have {available}")]
    PayloadTooShort { needed: usize, available: usize },
    /// Неизвестный код статуса в ответе
    #[error("unknown status code: {code}")]
    UnknownStatus { code: u16 },
    /// Строковое поле не является валидным UTF-8
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },
    /// Строковое поле длиннее, чем допускает u16-префикс
    #[error("{field} too long: {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },
    /// Ошибка ввода-вывода на сокете
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// Ошибка, после которой поток байт нельзя продолжать читать.
    ///
    /// Кадр с неверной длиной и ошибки ввода-вывода закрывают соединение,
    /// остальные ошибки превращаются в ответ `InvalidMessage`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrameLengthInvalid { .. } | Self::Io(_))
    }

    /// Соединение закрыто клиентом штатно (EOF на границе кадра).
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl ErrorExt for WireError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Io(_) => StatusCode::InternalServerError,
            _ => StatusCode::InvalidMessage,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
