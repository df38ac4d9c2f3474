use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий интерфейс ошибок, которые могут уйти клиенту.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус ответа. Всё, что не классифицировано, считается внутренней
    /// ошибкой.
    fn status_code(&self) -> StatusCode {
        StatusCode::InternalServerError
    }

    fn as_any(&self) -> &dyn Any;

    /// Текст для клиента. Детали внутренних ошибок остаются в логах.
    fn client_message(&self) -> String {
        if self.status_code().is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    fn log_message(&self) -> String {
        format!("{self:?}")
    }
}
