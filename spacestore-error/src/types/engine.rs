use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки движков коллекций.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Команда адресована коллекции с другим движком
    #[error("command not allowed: collection engine is {actual}, expected {expected}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// В коллекции отключены TTL
    #[error("ttl is disabled for this collection")]
    TtlDisabled,
    /// Момент истечения не в будущем
    #[error("invalid TTL: expires_at {expires_at} must be a future timestamp in nanoseconds")]
    ExpiryNotInFuture { expires_at: i64 },
    /// Ключ уже существует (условная запись)
    #[error("key already exists: {key}")]
    KeyExists { key: String },
    /// Ключ отсутствует
    #[error("key not found: {key}")]
    KeyNotFound { key: String },
    /// Недопустимый субъект брокера
    #[error("invalid subject `{subject}`: {reason}")]
    InvalidSubject {
        subject: String,
        reason: &'static str,
    },
}

impl ErrorExt for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::KindMismatch { .. } => StatusCode::CommandNotAllowed,
            Self::TtlDisabled
            | Self::ExpiryNotInFuture { .. }
            | Self::KeyExists { .. }
            | Self::InvalidSubject { .. } => StatusCode::BadRequest,
            Self::KeyNotFound { .. } => StatusCode::NotFound,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
