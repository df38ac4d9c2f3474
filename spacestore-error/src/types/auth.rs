use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки аутентификации и авторизации.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Неверные учётные данные
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Неизвестный метод входа
    #[error("unsupported login method: {method}")]
    UnsupportedMethod { method: u8 },
    /// Ключ API не прошёл структурную проверку
    #[error("malformed api key: {reason}")]
    MalformedApiKey { reason: &'static str },
    /// На соединении нет валидного принципала
    #[error("unauthorized")]
    Unauthorized,
    /// У принципала нет нужного уровня доступа
    #[error("forbidden: {required} access to database '{database}' required")]
    Forbidden {
        database: String,
        required: &'static str,
    },
    /// Провайдер идентичности недоступен
    #[error("identity provider failure: {reason}")]
    Provider { reason: String },
}

impl ErrorExt for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::UnsupportedMethod { .. } | Self::MalformedApiKey { .. } => {
                StatusCode::InvalidCredentials
            }
            Self::Unauthorized => StatusCode::Unauthorized,
            Self::Forbidden { .. } => StatusCode::Forbidden,
            Self::Provider { .. } => StatusCode::InternalServerError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            // Не подсказываем, что именно не так с учётными данными.
            Self::InvalidCredentials | Self::MalformedApiKey { .. } => {
                "invalid credentials".to_string()
            }
            Self::Provider { .. } => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
