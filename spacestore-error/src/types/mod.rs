pub mod auth;
pub mod catalog;
pub mod client;
pub mod codec;
pub mod command;
pub mod engine;
pub mod wire;

pub use auth::*;
pub use catalog::*;
pub use client::*;
pub use codec::*;
pub use command::*;
pub use engine::*;
pub use wire::*;

use crate::{ErrorExt, StatusCode};

/// Ошибка без собственного типа: статус и готовый текст.
///
/// В основном это `BadRequest` от разбора тела команды.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, message)
    }
}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
