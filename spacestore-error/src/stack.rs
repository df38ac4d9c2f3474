use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка, которую обработчики команд возвращают диспетчеру.
///
/// Статус ответа и текст для клиента всегда берутся из корневой ошибки.
/// Заметки, добавленные по пути наверх, видны только в логах.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    notes: Vec<Note>,
}

/// Заметка к ошибке и место, где её добавили.
#[derive(Debug, Clone)]
pub struct Note {
    pub message: String,
    pub location: &'static Location<'static>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            notes: Vec::new(),
        }
    }

    /// Добавляет заметку, не меняя статус.
    #[track_caller]
    pub fn context(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.notes.push(Note {
            message: message.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// Текст для поля `body` ответа об ошибке.
    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let notes: Vec<String> = self
            .notes
            .iter()
            .map(|n| format!("{} at {}:{}", n.message, n.location.file(), n.location.line()))
            .collect();
        f.debug_struct("StackError")
            .field("status", &self.status_code())
            .field("root", &self.root.log_message())
            .field("notes", &notes)
            .finish()
    }
}

/// Заметки выводятся от внешней к внутренней, затем корневая ошибка.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for note in self.notes.iter().rev() {
            write!(f, "{}: ", note.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
