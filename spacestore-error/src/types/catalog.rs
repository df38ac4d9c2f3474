use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки каталога баз данных и коллекций.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("database not found: {name}")]
    DatabaseNotFound { name: String },
    #[error("collection not found: {database}.{name}")]
    CollectionNotFound { database: String, name: String },
    /// Хранилище каталога недоступно
    #[error("catalog unavailable: {reason}")]
    Unavailable { reason: String },
}

impl ErrorExt for CatalogError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseNotFound { .. } => StatusCode::DatabaseNotFound,
            Self::CollectionNotFound { .. } => StatusCode::CollectionNotFound,
            Self::Unavailable { .. } => StatusCode::InternalServerError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
