use std::any::Any;

use thiserror::Error;

use crate::{CodecError, ErrorExt, StatusCode, WireError};

/// Ошибки клиента.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Ошибка подключения к серверу
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },
    /// Таймаут подключения
    #[error("connection timeout")]
    ConnectionTimeout,
    /// Соединение закрыто сервером
    #[error("connection closed by server")]
    ConnectionClosed,
    /// Ответ не пришёл вовремя
    #[error("request {request_id} timed out")]
    RequestTimeout { request_id: u32 },
    /// Сервер ответил ошибочным статусом
    #[error("server returned {status}: {message}")]
    Server { status: StatusCode, message: String },
    /// Ответ не соответствует ожидаемому формату
    #[error("unexpected response: {reason}")]
    UnexpectedResponse { reason: String },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// Статус сервера, если ошибка пришла из ответа.
    pub fn server_status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl ErrorExt for ClientError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Server { status, .. } => *status,
            Self::Codec(e) => e.status_code(),
            _ => StatusCode::InternalServerError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}
