use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки диспетчеризации команд.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Для идентификатора нет обработчика
    #[error("command not found: {id}")]
    NotFound { id: u16 },
}

impl ErrorExt for CommandError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::CommandNotFound,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
