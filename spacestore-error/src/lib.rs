//! Ошибки spacestore и статусы протокола.
//!
//! Каждый тип ошибки реализует [`ErrorExt`]: он знает свой [`StatusCode`]
//! и текст, который безопасно отдать клиенту. Обработчики команд
//! возвращают [`StackError`], диспетчер превращает его в ответ.

pub mod ext;
pub mod stack;
pub mod status_code;
pub mod types;

pub use ext::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

/// Результат обработчиков команд и служб сервера.
pub type SpaceResult<T> = Result<T, StackError>;
